use tokio_util::sync::CancellationToken;

use broker_kafka::KafkaProducer;
use event_api::TopicProducer;
use events_api_server::signal::shutdown_signal;
use events_api_server::{health_router, metrics, serve};

use super::config::Effective;
use super::domain::{Rng, build_event};
use super::error::GenError;

const MESSAGES_TOTAL: &str = "producer_messages_total";
const FAILED_MESSAGES_TOTAL: &str = "producer_failed_messages_total";

pub async fn run(args: &Effective) -> Result<(), GenError> {
    let prometheus = metrics::install_recorder()?;
    ::metrics::describe_counter!(MESSAGES_TOTAL, "Number of messages published by the producer");
    ::metrics::describe_counter!(FAILED_MESSAGES_TOTAL, "Number of messages failed to publish by the producer");

    let token = CancellationToken::new();
    let metrics_server = tokio::spawn(serve(args.metrics_port, health_router(prometheus), token.clone()));

    let result = match KafkaProducer::connect(&args.kafka).await {
        Ok(producer) => {
            tracing::info!(brokers = %args.kafka.brokers, topic = %args.topic, "producer connected to Kafka");
            let result = publish_loop(args, &producer).await;
            if let Err(e) = producer.flush().await {
                tracing::warn!(error = %e, "producer flush failed");
            }
            result
        }
        Err(e) => Err(GenError::Kafka(e)),
    };

    token.cancel();
    if let Ok(Err(e)) = metrics_server.await {
        tracing::error!(error = %e, "metrics server error");
    }
    result
}

async fn publish_loop(args: &Effective, producer: &dyn TopicProducer) -> Result<(), GenError> {
    let mut rng = Rng::new(args.seed);
    let mut interval = tokio::time::interval(args.interval);
    // First tick completes immediately; publish after a full interval.
    interval.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut sent = 0u64;
    let mut failed = 0u64;
    loop {
        if args.count.is_some_and(|n| sent + failed >= n) {
            break;
        }
        tokio::select! {
            signal = &mut shutdown => {
                signal?;
                break;
            }
            _ = interval.tick() => {}
        }

        let encoded = build_event(&args.event_type, &mut rng).and_then(|event| Ok((event.to_bytes()?, event)));
        let (body, event) = match encoded {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode event");
                failed += 1;
                continue;
            }
        };

        match producer.publish(&args.topic, None, &body).await {
            Ok(()) => {
                sent += 1;
                ::metrics::counter!(MESSAGES_TOTAL).increment(1);
                tracing::info!(
                    event_id = %event.event_id().unwrap_or_default(),
                    event_type = %event.event_type().unwrap_or_default(),
                    timestamp = %event.timestamp().unwrap_or_default(),
                    "event published"
                );
            }
            Err(e) => {
                failed += 1;
                ::metrics::counter!(FAILED_MESSAGES_TOTAL).increment(1);
                tracing::error!(event_id = %event.event_id().unwrap_or_default(), error = %e, "failed to publish event");
            }
        }
    }

    tracing::info!(sent, failed, "generator stopped");
    Ok(())
}
