//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while interpreting a job's provider or consumer fields.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown job provider: {0:?}")]
    UnknownProvider(String),

    #[error("unknown result consumer: {0:?}")]
    UnknownConsumer(String),

    #[error("invalid {kind} details: {source}")]
    InvalidDetails {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ModelError {
    pub fn invalid_details(kind: &'static str, source: serde_json::Error) -> Self {
        Self::InvalidDetails { kind, source }
    }
}
