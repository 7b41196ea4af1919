// src/infra/errors.rs — Error types for ragline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaglineError {
    /// A request/response call against the backend failed (docs, ingest,
    /// upload, shutdown). Never produced by the streaming path.
    #[error("Backend request failed: {message}")]
    Backend { message: String },

    /// Transport-level failure on the live push channel: connection dropped,
    /// HTTP failure, malformed SSE frame. Distinct from application-level
    /// text the backend may stream inside a token.
    #[error("Stream error: {message}")]
    Stream { message: String },

    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RaglineError {
    pub fn backend(err: reqwest::Error) -> Self {
        RaglineError::Backend {
            message: err.to_string(),
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        RaglineError::Stream {
            message: message.into(),
        }
    }
}
