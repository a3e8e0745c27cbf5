use std::future::Future;
use std::pin::Pin;

use crate::{ClientError, Event, EventQuery, StoredEvent};

// ════════════════════════════════════════════════════════════════
//  Collaborator clients
// ════════════════════════════════════════════════════════════════

/// One message pulled from the broker subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// `None` for a null-value (tombstone) message.
    pub payload: Option<Vec<u8>>,
}

/// Broker subscription: an ordered, lazy stream of messages plus an
/// explicit per-message commit.
///
/// Messages of one partition come out of `recv` in offset order. The
/// consumer calls `commit` only once it is done with a message, so the
/// cursor never runs ahead of the handler.
pub trait MessageSource: Send + Sync {
    /// Next message. `None` = subscription closed.
    fn recv(&self) -> Pin<Box<dyn Future<Output = Option<Result<InboundMessage, ClientError>>> + Send + '_>>;

    /// Mark `message` as handled; its offset becomes the partition cursor.
    fn commit(&self, message: &InboundMessage) -> Result<(), ClientError>;

    /// Stop fetching from one partition. Messages already delivered stay
    /// valid; the cursor is untouched.
    fn pause(&self, _topic: &str, _partition: i32) -> Result<(), ClientError> {
        Ok(())
    }

    /// Undo [`MessageSource::pause`].
    fn resume(&self, _topic: &str, _partition: i32) -> Result<(), ClientError> {
        Ok(())
    }

    /// Leave the consumer group and release the connection.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>>;
}

/// Durable document store (write side).
pub trait EventStore: Send + Sync {
    /// Insert one event. Returns the id generated by the store.
    fn insert<'a>(&'a self, event: &'a Event) -> Pin<Box<dyn Future<Output = Result<String, ClientError>> + Send + 'a>>;

    /// Release the connection pool.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

/// Durable document store (read side), newest first.
pub trait EventReader: Send + Sync {
    fn find<'a>(
        &'a self,
        query: &'a EventQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, ClientError>> + Send + 'a>>;
}

/// Producer for a named topic. Used for the dead-letter channel and by the
/// event generator.
pub trait TopicProducer: Send + Sync {
    /// Publish a single value. One attempt from the caller's point of view.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: Option<&'a str>,
        value: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + 'a>>;

    /// Wait for in-flight deliveries before shutdown.
    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
