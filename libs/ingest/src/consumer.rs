use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use event_api::{ClientError, Event, InboundMessage, MessageSource};

use crate::metrics::{DecodeFailed, InternalEvent, MessageReceived, OffsetCommitFailed, PartitionPaused};
use crate::retry::{Outcome, RetryController};

// ═══════════════════════════════════════════════════════════════
//  Per-message handler
// ═══════════════════════════════════════════════════════════════

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Body could not be decoded; dropped without retry or dead-lettering.
    DecodeFailed(ClientError),
    /// Decoded and run through the retry controller.
    Persisted(Outcome),
}

/// decode → retry-controlled insert → optional dead-letter publish.
///
/// Never fails: every error is logged and folded into the return value.
pub async fn handle_message(retry: &RetryController, message: &InboundMessage) -> Handled {
    MessageReceived { topic: &message.topic }.emit();

    let body = message.payload.as_deref().unwrap_or_default();
    let event = match Event::decode(body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "failed to process event - not retriable"
            );
            DecodeFailed { topic: &message.topic }.emit();
            return Handled::DecodeFailed(e);
        }
    };

    Handled::Persisted(retry.persist(&event).await)
}

// ═══════════════════════════════════════════════════════════════
//  Consumption loop: subscription → partition workers
// ═══════════════════════════════════════════════════════════════

struct PartitionWorker {
    tx: mpsc::UnboundedSender<InboundMessage>,
    backlog: Arc<Backlog>,
    handle: JoinHandle<()>,
}

/// Messages routed to one partition worker and not committed yet.
///
/// The partition is paused at the broker once `high` messages are waiting
/// and resumed when the worker brings the count down to `low`. The reader
/// never waits on a worker.
struct Backlog {
    topic: String,
    partition: i32,
    high: usize,
    low: usize,
    state: Mutex<BacklogState>,
}

#[derive(Default)]
struct BacklogState {
    queued: usize,
    paused: bool,
}

impl Backlog {
    fn new(topic: &str, partition: i32, buffer: usize) -> Self {
        let high = buffer.max(1);
        Self {
            topic: topic.to_string(),
            partition,
            high,
            low: high / 2,
            state: Mutex::new(BacklogState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, BacklogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reader side: one more message handed to the worker.
    fn push(&self, source: &dyn MessageSource) {
        let mut state = self.state();
        state.queued += 1;
        if state.queued < self.high || state.paused {
            return;
        }
        match source.pause(&self.topic, self.partition) {
            Ok(()) => {
                state.paused = true;
                tracing::debug!(topic = %self.topic, partition = self.partition, queued = state.queued, "partition paused");
                PartitionPaused { partition: self.partition }.emit();
            }
            Err(e) => tracing::warn!(topic = %self.topic, partition = self.partition, error = %e, "pause failed"),
        }
    }

    /// Worker side: one message handled and committed.
    fn pop(&self, source: &dyn MessageSource) {
        let mut state = self.state();
        state.queued = state.queued.saturating_sub(1);
        if !state.paused || state.queued > self.low {
            return;
        }
        match source.resume(&self.topic, self.partition) {
            Ok(()) => {
                state.paused = false;
                tracing::debug!(topic = %self.topic, partition = self.partition, queued = state.queued, "partition resumed");
            }
            Err(e) => tracing::warn!(topic = %self.topic, partition = self.partition, error = %e, "resume failed"),
        }
    }
}

/// Start the consumption loop.
///
/// A single reader pulls from `source` in delivery order and routes each
/// message to the worker of its partition. A worker runs one handler at a
/// time and commits the offset only after the handler returns, so the
/// cursor of a partition never passes an unfinished message. Partitions
/// are handled concurrently: a worker stuck in a long retry only pauses
/// its own partition once `partition_buffer` messages wait for it.
///
/// On cancellation the reader stops pulling; each worker finishes the
/// handler in flight and exits. Queued, uncommitted messages are left for
/// redelivery.
pub fn spawn_consumer(
    source: Arc<dyn MessageSource>,
    retry: Arc<RetryController>,
    partition_buffer: usize,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut workers: HashMap<(String, i32), PartitionWorker> = HashMap::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = source.recv() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    tracing::error!(error = ?e, "receive error");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                        _ = token.cancelled() => break,
                    }
                }
                None => {
                    tracing::info!("subscription closed");
                    break;
                }
            };

            let key = (message.topic.clone(), message.partition);
            let worker = workers.entry(key).or_insert_with(|| {
                spawn_partition_worker(
                    &message.topic,
                    message.partition,
                    source.clone(),
                    retry.clone(),
                    partition_buffer,
                    token.clone(),
                )
            });

            worker.backlog.push(source.as_ref());
            if worker.tx.send(message).is_err() {
                tracing::error!("partition worker gone, stopping consumer");
                break;
            }
        }

        // Closing the senders lets idle workers exit.
        let handles: Vec<JoinHandle<()>> = workers.into_values().map(|w| w.handle).collect();
        for h in handles {
            let _ = h.await;
        }
        tracing::info!("consumer stopped");
    })
}

fn spawn_partition_worker(
    topic: &str,
    partition: i32,
    source: Arc<dyn MessageSource>,
    retry: Arc<RetryController>,
    buffer: usize,
    token: CancellationToken,
) -> PartitionWorker {
    let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
    let backlog = Arc::new(Backlog::new(topic, partition, buffer));
    let topic = topic.to_string();

    let worker_backlog = backlog.clone();
    let handle = tokio::spawn(async move {
        tracing::debug!(%topic, partition, "partition worker started");
        loop {
            let message = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            // Not raced against the token: a started handler always completes.
            let handled = handle_message(&retry, &message).await;
            tracing::debug!(%topic, partition, offset = message.offset, ?handled, "message handled");

            if let Err(e) = source.commit(&message) {
                tracing::warn!(
                    %topic,
                    partition,
                    offset = message.offset,
                    error = %e,
                    "offset commit failed, message may be redelivered"
                );
                OffsetCommitFailed { partition }.emit();
            }
            worker_backlog.pop(source.as_ref());
        }
        tracing::debug!(%topic, partition, "partition worker stopped");
    });

    PartitionWorker { tx, backlog, handle }
}
