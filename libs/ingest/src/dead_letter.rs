use std::sync::Arc;

use event_api::{ClientError, DeadLetterEnvelope, Event, TopicProducer};

use crate::metrics::{DeadLetterFailed, DeadLetterPublished, InternalEvent};

/// Wraps exhausted events in a [`DeadLetterEnvelope`] and hands them to the
/// dead-letter topic.
///
/// One publish attempt per event. When that attempt fails the event is
/// logged and dropped: there is no further fallback.
pub struct DeadLetterPublisher {
    producer: Arc<dyn TopicProducer>,
    topic: String,
}

impl DeadLetterPublisher {
    pub fn new(producer: Arc<dyn TopicProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    pub async fn publish(&self, event: &Event, reason: &str) -> Result<(), ClientError> {
        let envelope = DeadLetterEnvelope::new(event.clone(), reason);
        let result = match envelope.to_bytes() {
            Ok(bytes) => self.producer.publish(&self.topic, None, &bytes).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    dlq_topic = %self.topic,
                    event_id = %event.event_id().unwrap_or_default(),
                    "event sent to dead-letter topic"
                );
                DeadLetterPublished.emit();
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    dlq_topic = %self.topic,
                    dlq_error = %e,
                    original_event = %event,
                    "failed to send event to dead-letter topic, event dropped"
                );
                DeadLetterFailed.emit();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingProducer, signup_event};

    #[tokio::test]
    async fn publishes_one_envelope_to_configured_topic() {
        let producer = Arc::new(RecordingProducer::new());
        let publisher = DeadLetterPublisher::new(producer.clone(), "events-dlq");

        publisher.publish(&signup_event(), "write timeout").await.unwrap();

        let sent = producer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "events-dlq");

        let envelope = DeadLetterEnvelope::from_bytes(&sent[0].1).unwrap();
        assert_eq!(envelope.original_event, signup_event());
        assert_eq!(envelope.failed_reason, "write timeout");
    }

    #[tokio::test]
    async fn publish_failure_is_reported_and_not_retried() {
        let producer = Arc::new(RecordingProducer::failing("broker down"));
        let publisher = DeadLetterPublisher::new(producer.clone(), "events-dlq");

        let err = publisher.publish(&signup_event(), "write timeout").await.unwrap_err();

        assert_eq!(err.message(), "broker down");
        assert_eq!(producer.attempts(), 1);
        assert!(producer.sent().is_empty());
    }
}
