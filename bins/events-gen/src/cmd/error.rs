use event_api::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("{0}")]
    Config(String),

    #[error("kafka: {0}")]
    Kafka(#[from] ClientError),

    #[error("{0}")]
    Server(#[from] events_api_server::ApiServerError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
