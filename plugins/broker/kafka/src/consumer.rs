use std::future::Future;
use std::pin::Pin;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::util::Timeout;

use event_api::{ClientError, InboundMessage, MessageSource};

use crate::{KafkaConfig, from_kafka};

/// Consumer-group subscription to a single topic.
///
/// Offsets are stored explicitly through [`MessageSource::commit`] and
/// flushed by librdkafka's periodic auto-commit, so only handled messages
/// ever become part of the group cursor.
pub struct KafkaSubscription {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaSubscription {
    /// Create the consumer, check that the broker answers, subscribe.
    /// A new group starts from the earliest available offset.
    pub async fn connect(config: &KafkaConfig, group_id: &str, topic: &str) -> Result<Self, ClientError> {
        let consumer: StreamConsumer = config
            .client_config()
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| from_kafka("create consumer", e))?;

        let timeout = Timeout::After(config.connection_timeout());
        tokio::task::block_in_place(|| consumer.fetch_metadata(Some(topic), timeout))
            .map_err(|e| ClientError::config(format!("broker {} unreachable: {e}", config.brokers)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| from_kafka("subscribe", e))?;

        tracing::info!(
            brokers = %config.brokers,
            %topic,
            group_id,
            "consumer connected to Kafka"
        );

        Ok(Self {
            consumer,
            topic: topic.to_string(),
        })
    }
}

impl MessageSource for KafkaSubscription {
    fn recv(&self) -> Pin<Box<dyn Future<Output = Option<Result<InboundMessage, ClientError>>> + Send + '_>> {
        Box::pin(async move {
            let result = match self.consumer.recv().await {
                Ok(m) => Ok(InboundMessage {
                    topic: m.topic().to_string(),
                    partition: m.partition(),
                    offset: m.offset(),
                    payload: m.payload().map(<[u8]>::to_vec),
                }),
                Err(e) => Err(from_kafka("receive", e)),
            };
            Some(result)
        })
    }

    fn commit(&self, message: &InboundMessage) -> Result<(), ClientError> {
        // The group cursor points at the next message to read.
        self.consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)
            .map_err(|e| from_kafka("store offset", e))
    }

    fn pause(&self, topic: &str, partition: i32) -> Result<(), ClientError> {
        self.consumer
            .pause(&single_partition(topic, partition))
            .map_err(|e| from_kafka("pause partition", e))
    }

    fn resume(&self, topic: &str, partition: i32) -> Result<(), ClientError> {
        self.consumer
            .resume(&single_partition(topic, partition))
            .map_err(|e| from_kafka("resume partition", e))
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async move {
            let committed = tokio::task::block_in_place(|| self.consumer.commit_consumer_state(CommitMode::Sync));
            match committed {
                Ok(()) => {}
                Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                    tracing::debug!(topic = %self.topic, "nothing to commit on close");
                }
                Err(e) => tracing::warn!(topic = %self.topic, error = %e, "final offset commit failed"),
            }
            self.consumer.unsubscribe();
            tracing::info!(topic = %self.topic, "consumer disconnected");
            Ok(())
        })
    }
}

fn single_partition(topic: &str, partition: i32) -> TopicPartitionList {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition(topic, partition);
    tpl
}
