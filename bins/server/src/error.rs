use event_api::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Ingest(#[from] ingest::IngestError),

    #[error("{context}: {source}")]
    Connect { context: &'static str, source: ClientError },

    #[error("{0}")]
    ApiServer(#[from] events_api_server::ApiServerError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl ServerError {
    pub fn connect(context: &'static str) -> impl FnOnce(ClientError) -> Self {
        move |source| Self::Connect { context, source }
    }
}
