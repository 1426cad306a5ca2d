//! Storage backends for the imgproc worker.
//!
//! This crate provides:
//! - The [`ObjectStore`] capability with an S3-compatible implementation
//! - An in-memory object store for tests and local runs
//! - Local filesystem reads and private-mode copies

pub mod error;
pub mod local;
pub mod memory;
pub mod object;
pub mod s3;

pub use error::{StorageError, StorageResult};
pub use local::LocalStore;
pub use memory::{MemoryObjectStore, StoredObject};
pub use object::{object_key, Acl, ObjectStore, DEFAULT_CACHE_CONTROL};
pub use s3::{S3Config, S3Store};
