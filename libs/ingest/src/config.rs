use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::IngestError;
use crate::retry::{FixedDelay, NoDelay, RetryDelay};

fn default_dead_letter_topic() -> String {
    "events-dlq".into()
}
fn default_max_retries() -> u32 {
    3
}
fn default_partition_buffer() -> usize {
    64
}

/// Consumption pipeline settings. Built once at startup, read-only after.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestConfig {
    /// Topic the consumer subscribes to.
    pub topic: String,
    #[serde(default = "default_dead_letter_topic")]
    pub dead_letter_topic: String,
    /// Total insert attempts per event, >= 1.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause between attempts. 0 = back-to-back.
    #[serde(default)]
    pub retry_delay_ms: u64,
    /// Uncommitted messages per partition before the partition is paused.
    #[serde(default = "default_partition_buffer")]
    pub partition_buffer: usize,
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_retries < 1 {
            return Err(IngestError::Config("max_retries must be at least 1".into()));
        }
        if self.topic.trim().is_empty() {
            return Err(IngestError::Config("topic must not be empty".into()));
        }
        if self.dead_letter_topic.trim().is_empty() {
            return Err(IngestError::Config("dead_letter_topic must not be empty".into()));
        }
        if self.topic == self.dead_letter_topic {
            return Err(IngestError::Config(format!(
                "dead_letter_topic must differ from topic '{}'",
                self.topic
            )));
        }
        if self.partition_buffer == 0 {
            return Err(IngestError::Config("partition_buffer must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Arc<dyn RetryDelay> {
        match self.retry_delay_ms {
            0 => Arc::new(NoDelay),
            ms => Arc::new(FixedDelay(Duration::from_millis(ms))),
        }
    }

    /// Upper bound on time spent on retry pauses for one event.
    pub fn max_retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(self.max_retries.saturating_sub(1))))
    }
}
