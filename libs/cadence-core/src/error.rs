#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    #[error("config error: {0}")]
    Config(String),

    #[error("broker connect: {0}")]
    Connect(String),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("recording not found: {0}")]
    RecordingNotFound(String),

    #[error("malformed record at line {line}: {detail}")]
    MalformedRecord { line: usize, detail: String },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CadenceError {
    /// Add context to the error.
    ///
    /// Produces: `"context: original message"` while keeping the variant.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            CadenceError::Config(msg) => CadenceError::Config(format!("{ctx}: {msg}")),
            CadenceError::Connect(msg) => CadenceError::Connect(format!("{ctx}: {msg}")),
            CadenceError::StoreUnavailable(msg) => {
                CadenceError::StoreUnavailable(format!("{ctx}: {msg}"))
            }
            CadenceError::Publish(msg) => CadenceError::Publish(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
