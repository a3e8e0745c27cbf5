use std::sync::Arc;
use std::time::Duration;

use event_api::{Event, EventStore};

use crate::dead_letter::DeadLetterPublisher;
use crate::metrics::{AttemptResult, EventStored, InternalEvent, StoreAttempt};

// ═══════════════════════════════════════════════════════════════
//  Delay between attempts
// ═══════════════════════════════════════════════════════════════

/// Pause inserted after failed attempt `attempt` (1-based) and before the
/// next one.
pub trait RetryDelay: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Retries are issued back-to-back.
pub struct NoDelay;

impl RetryDelay for NoDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Same pause after every failed attempt. Bounds the worst-case stall of a
/// partition to `max_retries * store_timeout + (max_retries - 1) * delay`.
pub struct FixedDelay(pub Duration);

impl RetryDelay for FixedDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

// ═══════════════════════════════════════════════════════════════
//  Retry controller
// ═══════════════════════════════════════════════════════════════

/// Terminal outcome of [`RetryController::persist`]. Exactly one per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The store accepted the event.
    Stored { id: String, attempts: u32 },
    /// Every attempt failed; the envelope reached the dead-letter topic.
    DeadLettered { attempts: u32, reason: String },
    /// Every attempt failed and so did the dead-letter publish.
    Lost {
        attempts: u32,
        reason: String,
        publish_error: String,
    },
}

impl Outcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Outcome::Stored { attempts, .. }
            | Outcome::DeadLettered { attempts, .. }
            | Outcome::Lost { attempts, .. } => *attempts,
        }
    }
}

/// Bounded-attempt persistence.
///
/// Runs inline in the partition worker: the next message of the same
/// partition is not touched until `persist` returns.
pub struct RetryController {
    store: Arc<dyn EventStore>,
    dead_letter: DeadLetterPublisher,
    max_retries: u32,
    delay: Arc<dyn RetryDelay>,
}

impl RetryController {
    /// `max_retries` is the total number of insert attempts; values below 1
    /// are treated as 1.
    pub fn new(store: Arc<dyn EventStore>, dead_letter: DeadLetterPublisher, max_retries: u32) -> Self {
        Self {
            store,
            dead_letter,
            max_retries: max_retries.max(1),
            delay: Arc::new(NoDelay),
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn RetryDelay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub async fn persist(&self, event: &Event) -> Outcome {
        let event_id = event.event_id().unwrap_or_default();
        let mut attempt = 1;
        loop {
            let err = match self.store.insert(event).await {
                Ok(id) => {
                    StoreAttempt { result: AttemptResult::Ok }.emit();
                    EventStored { attempts: attempt }.emit();
                    tracing::info!(
                        %event_id,
                        event_type = %event.event_type().unwrap_or_default(),
                        inserted_id = %id,
                        attempt,
                        "event inserted"
                    );
                    return Outcome::Stored { id, attempts: attempt };
                }
                Err(e) => e,
            };
            StoreAttempt { result: AttemptResult::Error }.emit();

            if attempt >= self.max_retries {
                tracing::error!(
                    %event_id,
                    attempt,
                    max_retries = self.max_retries,
                    error = %err,
                    "max retries reached, sending to dead-letter topic"
                );
                let reason = err.message().to_string();
                return match self.dead_letter.publish(event, &reason).await {
                    Ok(()) => Outcome::DeadLettered { attempts: attempt, reason },
                    Err(e) => Outcome::Lost {
                        attempts: attempt,
                        reason,
                        publish_error: e.message().to_string(),
                    },
                };
            }

            tracing::warn!(
                %event_id,
                attempt,
                max_retries = self.max_retries,
                error = ?err,
                "insert failed, retrying"
            );
            let pause = self.delay.delay(attempt);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            attempt += 1;
        }
    }
}
