//! Internal events for metrics emission.
//!
//! Every terminal outcome of the consumption pipeline maps to one of these
//! events; `emit` records the corresponding Prometheus counter.

use metrics::counter;
use tracing::trace;

pub trait InternalEvent {
    fn emit(self);
}

/// A message was pulled from the subscription.
pub struct MessageReceived<'a> {
    pub topic: &'a str,
}

impl InternalEvent for MessageReceived<'_> {
    fn emit(self) {
        trace!(topic = %self.topic, "message received");
        counter!("ingest_events_received_total", "topic" => self.topic.to_string()).increment(1);
    }
}

/// The message body could not be decoded and was dropped.
pub struct DecodeFailed<'a> {
    pub topic: &'a str,
}

impl InternalEvent for DecodeFailed<'_> {
    fn emit(self) {
        counter!("ingest_decode_failures_total", "topic" => self.topic.to_string()).increment(1);
    }
}

/// Result of a single insert attempt.
#[derive(Debug, Clone, Copy)]
pub enum AttemptResult {
    Ok,
    Error,
}

impl AttemptResult {
    fn as_str(&self) -> &'static str {
        match self {
            AttemptResult::Ok => "ok",
            AttemptResult::Error => "error",
        }
    }
}

pub struct StoreAttempt {
    pub result: AttemptResult,
}

impl InternalEvent for StoreAttempt {
    fn emit(self) {
        counter!("ingest_store_attempts_total", "result" => self.result.as_str()).increment(1);
    }
}

/// Event durably stored.
pub struct EventStored {
    pub attempts: u32,
}

impl InternalEvent for EventStored {
    fn emit(self) {
        trace!(attempts = self.attempts, "event stored");
        counter!("ingest_events_stored_total").increment(1);
    }
}

pub struct DeadLetterPublished;

impl InternalEvent for DeadLetterPublished {
    fn emit(self) {
        counter!("ingest_dead_letter_published_total").increment(1);
    }
}

/// Dead-letter publish failed; the event is gone.
pub struct DeadLetterFailed;

impl InternalEvent for DeadLetterFailed {
    fn emit(self) {
        counter!("ingest_dead_letter_failed_total").increment(1);
    }
}

pub struct OffsetCommitFailed {
    pub partition: i32,
}

impl InternalEvent for OffsetCommitFailed {
    fn emit(self) {
        counter!("ingest_offset_commit_failures_total", "partition" => self.partition.to_string())
            .increment(1);
    }
}

/// A partition backlog reached its limit and fetching was paused.
pub struct PartitionPaused {
    pub partition: i32,
}

impl InternalEvent for PartitionPaused {
    fn emit(self) {
        counter!("ingest_partition_pauses_total", "partition" => self.partition.to_string()).increment(1);
    }
}
