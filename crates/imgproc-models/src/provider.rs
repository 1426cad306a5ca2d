//! Raw providers and result consumers.
//!
//! A job names its input source and output destination with a discriminant
//! string (`"aws"` or `"local"`) plus an opaque details object. Both are kept
//! as-is on the [`Job`](crate::Job) and only decoded here, when a task needs
//! them, so a bad discriminant surfaces as a task failure rather than a
//! malformed message.

use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Provider / consumer discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageKind {
    /// S3-compatible object storage
    Aws,
    /// Local filesystem
    Local,
    /// Anything else, kept verbatim for error reporting
    Unknown(String),
}

impl Default for StorageKind {
    fn default() -> Self {
        StorageKind::Unknown(String::new())
    }
}

impl JsonSchema for StorageKind {
    fn schema_name() -> String {
        "StorageKind".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl From<String> for StorageKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "aws" => StorageKind::Aws,
            "local" => StorageKind::Local,
            _ => StorageKind::Unknown(s),
        }
    }
}

impl From<StorageKind> for String {
    fn from(kind: StorageKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Aws => f.write_str("aws"),
            StorageKind::Local => f.write_str("local"),
            StorageKind::Unknown(s) => f.write_str(s),
        }
    }
}

#[derive(Deserialize)]
struct AwsProviderDetails {
    bucket: String,
    key: String,
}

#[derive(Deserialize)]
struct LocalProviderDetails {
    path: PathBuf,
}

#[derive(Deserialize)]
struct AwsConsumerDetails {
    bucket: String,
    key_folder: String,
}

#[derive(Deserialize)]
struct LocalConsumerDetails {
    path_folder: PathBuf,
}

/// Source of a job's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawProvider {
    Aws { bucket: String, key: String },
    Local { path: PathBuf },
}

impl RawProvider {
    pub fn resolve(kind: &StorageKind, details: &serde_json::Value) -> ModelResult<Self> {
        match kind {
            StorageKind::Aws => {
                let d: AwsProviderDetails = serde_json::from_value(details.clone())
                    .map_err(|e| ModelError::invalid_details("aws provider", e))?;
                Ok(RawProvider::Aws {
                    bucket: d.bucket,
                    key: d.key,
                })
            }
            StorageKind::Local => {
                let d: LocalProviderDetails = serde_json::from_value(details.clone())
                    .map_err(|e| ModelError::invalid_details("local provider", e))?;
                Ok(RawProvider::Local { path: d.path })
            }
            StorageKind::Unknown(s) => Err(ModelError::UnknownProvider(s.clone())),
        }
    }

    /// Details object for building jobs programmatically.
    pub fn details(&self) -> serde_json::Value {
        match self {
            RawProvider::Aws { bucket, key } => serde_json::json!({ "bucket": bucket, "key": key }),
            RawProvider::Local { path } => serde_json::json!({ "path": path }),
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            RawProvider::Aws { .. } => StorageKind::Aws,
            RawProvider::Local { .. } => StorageKind::Local,
        }
    }
}

/// Destination of a job's produced files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultConsumer {
    Aws { bucket: String, key_folder: String },
    Local { path_folder: PathBuf },
}

impl ResultConsumer {
    pub fn resolve(kind: &StorageKind, details: &serde_json::Value) -> ModelResult<Self> {
        match kind {
            StorageKind::Aws => {
                let d: AwsConsumerDetails = serde_json::from_value(details.clone())
                    .map_err(|e| ModelError::invalid_details("aws consumer", e))?;
                Ok(ResultConsumer::Aws {
                    bucket: d.bucket,
                    key_folder: d.key_folder,
                })
            }
            StorageKind::Local => {
                let d: LocalConsumerDetails = serde_json::from_value(details.clone())
                    .map_err(|e| ModelError::invalid_details("local consumer", e))?;
                Ok(ResultConsumer::Local {
                    path_folder: d.path_folder,
                })
            }
            StorageKind::Unknown(s) => Err(ModelError::UnknownConsumer(s.clone())),
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            ResultConsumer::Aws { bucket, key_folder } => {
                serde_json::json!({ "bucket": bucket, "key_folder": key_folder })
            }
            ResultConsumer::Local { path_folder } => {
                serde_json::json!({ "path_folder": path_folder })
            }
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            ResultConsumer::Aws { .. } => StorageKind::Aws,
            ResultConsumer::Local { .. } => StorageKind::Local,
        }
    }
}
