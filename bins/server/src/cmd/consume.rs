use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use broker_kafka::{KafkaProducer, KafkaSubscription};
use event_api::{MessageSource, TopicProducer};
use events_api_server::signal::shutdown_signal;
use events_api_server::{health_router, metrics, serve};
use ingest::{DeadLetterPublisher, RetryController, spawn_consumer};

use super::store::OpenedStore;
use crate::config::{ConsumeArgs, ConsumeSettings};
use crate::error::ServerError;

/// Collaborator handles opened during startup. Whatever got opened is
/// closed again on every exit path.
#[derive(Default)]
struct Connections {
    store: Option<OpenedStore>,
    producer: Option<Arc<KafkaProducer>>,
    source: Option<Arc<KafkaSubscription>>,
}

impl Connections {
    async fn open(&mut self, settings: &ConsumeSettings) -> Result<(), ServerError> {
        self.store = Some(OpenedStore::open(&settings.store).await?);

        let producer = KafkaProducer::connect(&settings.kafka)
            .await
            .map_err(ServerError::connect("connect dead-letter producer"))?;
        self.producer = Some(Arc::new(producer));

        let source = KafkaSubscription::connect(&settings.kafka, &settings.group_id, &settings.ingest.topic)
            .await
            .map_err(ServerError::connect("subscribe"))?;
        self.source = Some(Arc::new(source));
        Ok(())
    }

    /// Consumer first so no new work arrives, then the producer flush,
    /// then the store.
    async fn close(&mut self) {
        if let Some(source) = self.source.take()
            && let Err(e) = source.close().await
        {
            tracing::warn!(error = %e, "consumer close failed");
        }
        if let Some(producer) = self.producer.take()
            && let Err(e) = producer.flush().await
        {
            tracing::warn!(error = %e, "dead-letter producer flush failed");
        }
        if let Some(store) = self.store.take() {
            store.close().await;
        }
    }
}

pub async fn run(args: ConsumeArgs) -> Result<(), ServerError> {
    let settings = ConsumeSettings::resolve(&args)?;
    tracing::info!(
        brokers = %settings.kafka.brokers,
        topic = %settings.ingest.topic,
        group_id = %settings.group_id,
        dead_letter_topic = %settings.ingest.dead_letter_topic,
        max_retries = settings.ingest.max_retries,
        max_retry_pause_ms = settings.ingest.max_retry_pause().as_millis() as u64,
        "event-server consume starting"
    );

    let prometheus = metrics::install_recorder()?;
    let token = CancellationToken::new();
    let metrics_server = tokio::spawn(serve(settings.metrics_port, health_router(prometheus), token.clone()));

    let mut connections = Connections::default();
    let result = match connections.open(&settings).await {
        Ok(()) => consume(&settings, &connections, &token).await,
        Err(e) => Err(e),
    };

    token.cancel();
    connections.close().await;
    match metrics_server.await {
        Ok(Err(e)) => tracing::error!(error = %e, "metrics server error"),
        Err(e) => tracing::error!(error = %e, "metrics server task failed"),
        Ok(Ok(())) => {}
    }

    tracing::info!("shutdown complete");
    result
}

async fn consume(settings: &ConsumeSettings, connections: &Connections, token: &CancellationToken) -> Result<(), ServerError> {
    let (Some(store), Some(producer), Some(source)) = (&connections.store, &connections.producer, &connections.source)
    else {
        return Err(ServerError::Config { context: "startup", detail: "connections not open".into() });
    };

    let producer: Arc<dyn TopicProducer> = producer.clone();
    let dead_letter = DeadLetterPublisher::new(producer, settings.ingest.dead_letter_topic.clone());
    let retry = RetryController::new(store.writer(), dead_letter, settings.ingest.max_retries)
        .with_delay(settings.ingest.retry_delay());

    let source: Arc<dyn MessageSource> = source.clone();
    let consumer_token = token.child_token();
    let mut consumer = spawn_consumer(
        source,
        Arc::new(retry),
        settings.ingest.partition_buffer,
        consumer_token.clone(),
    );
    tracing::info!("consumer ready");

    let stopped = tokio::select! {
        signal = shutdown_signal() => signal.map(|_| ()).map_err(ServerError::from),
        joined = &mut consumer => {
            if let Err(e) = joined {
                tracing::error!(error = %e, "consumer task failed");
            } else {
                tracing::warn!("consumer exited");
            }
            return Ok(());
        }
    };

    tracing::info!("shutting down...");
    consumer_token.cancel();
    drain(consumer, settings.shutdown_timeout).await;
    stopped
}

/// Wait for in-flight handlers, abort once `timeout` runs out.
async fn drain(mut consumer: JoinHandle<()>, timeout: std::time::Duration) {
    match tokio::time::timeout(timeout, &mut consumer).await {
        Ok(_) => tracing::info!("consumer drained"),
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "consumer did not stop in time, aborting");
            consumer.abort();
            let _ = consumer.await;
        }
    }
}
