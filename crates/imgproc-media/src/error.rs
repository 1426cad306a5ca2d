//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while running the conversion tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("{program} failed (exit code {exit_code:?}): {stderr}")]
    ToolFailed {
        program: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("unknown image format")]
    UnknownFormat,

    #[error("bad response from {tool}: {message}")]
    BadToolResponse { tool: &'static str, message: String },

    #[error("no frames extracted")]
    NoFrames,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a tool failure error.
    pub fn tool_failed(program: impl Into<String>, stderr: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::ToolFailed {
            program: program.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Create a bad tool response error.
    pub fn bad_response(tool: &'static str, message: impl Into<String>) -> Self {
        Self::BadToolResponse {
            tool,
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
