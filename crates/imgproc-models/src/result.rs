//! Terminal result message.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::file::File;
use crate::job::JobId;

/// Published once per job on the result queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResultMessage {
    pub job_id: JobId,
    pub success: bool,
    #[serde(default)]
    pub files: Vec<File>,
    /// Human readable failure, empty on success
    #[serde(default)]
    pub error: String,
}

impl ResultMessage {
    pub fn success(job_id: JobId, files: Vec<File>) -> Self {
        Self {
            job_id,
            success: true,
            files,
            error: String::new(),
        }
    }

    pub fn failure(job_id: JobId, error: impl Into<String>) -> Self {
        Self {
            job_id,
            success: false,
            files: Vec::new(),
            error: error.into(),
        }
    }
}
