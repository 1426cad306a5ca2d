//! Worker error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown image format")]
    FormatDetection,

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Media error: {0}")]
    Media(#[from] imgproc_media::MediaError),

    #[error("task exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("task cancelled: {0}")]
    Cancelled(String),

    #[error("task panicked: {0}")]
    Panic(String),

    #[error("Storage error: {0}")]
    Storage(#[from] imgproc_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] imgproc_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<imgproc_models::ModelError> for WorkerError {
    fn from(e: imgproc_models::ModelError) -> Self {
        Self::Provider(e.to_string())
    }
}

impl WorkerError {
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// True for errors raised because the task scope was cancelled.
    pub fn is_cancellation(&self) -> bool {
        match self {
            WorkerError::Cancelled(_) | WorkerError::Timeout(_) => true,
            WorkerError::Media(e) => e.is_cancelled(),
            WorkerError::Stage(e) => e.causes.iter().any(|c| c.error.is_cancellation()),
            _ => false,
        }
    }
}

/// Fan-out stage whose units can fail independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resize,
    Encode,
    Deliver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Resize => f.write_str("stage two"),
            Stage::Encode => f.write_str("stage three"),
            Stage::Deliver => f.write_str("delivery"),
        }
    }
}

/// One failed unit of a fan-out stage, e.g. a size or an output file.
#[derive(Debug)]
pub struct StageCause {
    pub unit: String,
    pub error: WorkerError,
}

impl fmt::Display for StageCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.unit, self.error)
    }
}

/// Every failure of one stage.
#[derive(Debug, Error)]
#[error("{stage} failed with {} error(s): {}", .causes.len(), join_causes(.causes))]
pub struct StageError {
    pub stage: Stage,
    pub causes: Vec<StageCause>,
}

impl StageError {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            causes: Vec::new(),
        }
    }

    pub fn push(&mut self, unit: impl Into<String>, error: impl Into<WorkerError>) {
        self.causes.push(StageCause {
            unit: unit.into(),
            error: error.into(),
        });
    }

    /// `Ok` when nothing failed.
    pub fn into_result(self) -> WorkerResult<()> {
        if self.causes.is_empty() {
            Ok(())
        } else {
            Err(WorkerError::Stage(self))
        }
    }
}

fn join_causes(causes: &[StageCause]) -> String {
    causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
