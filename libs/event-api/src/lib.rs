pub mod client;
pub mod error;
pub mod event;
pub mod util;

pub use client::{EventReader, EventStore, InboundMessage, MessageSource, TopicProducer};
pub use error::{ClientError, ErrorKind};
pub use event::{DEFAULT_LIMIT, DEFAULT_PAGE, DeadLetterEnvelope, Event, EventQuery, StoredEvent};
pub use util::{now_iso, to_iso};
