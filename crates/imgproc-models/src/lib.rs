//! Shared data models for the imgproc worker.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, output sizes and the settings bitmask
//! - Raw providers and result consumers
//! - Container and output formats
//! - Produced file records
//! - Task events and outbound queue messages

pub mod error;
pub mod event;
pub mod file;
pub mod format;
pub mod image;
pub mod job;
pub mod provider;
pub mod result;
pub mod settings;

pub use error::{ModelError, ModelResult};
pub use event::{TaskEvent, TaskEventType};
pub use file::File;
pub use format::{ContainerType, OutputFormat, RAW_FILE_STEM};
pub use image::Image;
pub use job::{default_sizes, size_name_problem, AspectRatio, ImageSize, Job, JobId};
pub use provider::{RawProvider, ResultConsumer, StorageKind};
pub use result::ResultMessage;
pub use settings::Settings;
