use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;

use event_api::{ClientError, TopicProducer};

use crate::{KafkaConfig, from_kafka};

/// Producer used for the dead-letter topic and by the event generator.
pub struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaProducer {
    pub async fn connect(config: &KafkaConfig) -> Result<Self, ClientError> {
        let producer: FutureProducer = config
            .client_config()
            .set("message.timeout.ms", config.request_timeout_ms.to_string())
            .create()
            .map_err(|e| from_kafka("create producer", e))?;

        let timeout = Timeout::After(config.connection_timeout());
        tokio::task::block_in_place(|| producer.client().fetch_metadata(None, timeout))
            .map_err(|e| ClientError::config(format!("broker {} unreachable: {e}", config.brokers)))?;

        tracing::info!(brokers = %config.brokers, "producer connected to Kafka");

        Ok(Self {
            producer,
            send_timeout: config.request_timeout(),
        })
    }
}

impl TopicProducer for KafkaProducer {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: Option<&'a str>,
        value: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + 'a>> {
        Box::pin(async move {
            let mut record = FutureRecord::<str, [u8]>::to(topic).payload(value);
            if let Some(key) = key {
                record = record.key(key);
            }
            self.producer
                .send(record, Timeout::After(self.send_timeout))
                .await
                .map(|_| ())
                .map_err(|(e, _)| from_kafka("produce", e))
        })
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async move {
            tokio::task::block_in_place(|| self.producer.flush(Timeout::After(self.send_timeout)))
                .map_err(|e| from_kafka("flush", e))
        })
    }
}
