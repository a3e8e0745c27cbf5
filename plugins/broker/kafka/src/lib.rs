mod config;
mod consumer;
mod producer;

pub use config::KafkaConfig;
pub use consumer::KafkaSubscription;
pub use producer::KafkaProducer;

use event_api::ClientError;
use rdkafka::error::KafkaError;

fn from_kafka(context: &str, e: KafkaError) -> ClientError {
    match e {
        KafkaError::ClientConfig(..) | KafkaError::ClientCreation(_) | KafkaError::Subscription(_) => {
            ClientError::config(format!("{context}: {e}"))
        }
        KafkaError::MessageProduction(_) | KafkaError::MessageConsumption(_) => {
            ClientError::io(format!("{context}: {e}"))
        }
        other => ClientError::io(format!("{context}: {other}")),
    }
}
