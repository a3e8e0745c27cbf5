pub mod config;
pub mod error;
pub mod metrics;
mod consumer;
mod dead_letter;
mod retry;
#[cfg(test)]
mod test_support;

pub use config::IngestConfig;
pub use consumer::{Handled, handle_message, spawn_consumer};
pub use dead_letter::DeadLetterPublisher;
pub use error::IngestError;
pub use retry::{FixedDelay, NoDelay, Outcome, RetryController, RetryDelay};
