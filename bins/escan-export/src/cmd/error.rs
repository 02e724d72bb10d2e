use escan_client::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    /// Remote errors display as the bare server message.
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("serialize result: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
