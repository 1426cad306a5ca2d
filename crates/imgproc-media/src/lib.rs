//! External tool wrappers for image and video conversion.
//!
//! This crate provides:
//! - Container detection by magic numbers
//! - A cancellable command runner (children are killed on cancel or drop)
//! - Stage one frame extraction and timing for every supported container
//! - Stage two resizing and stage three encoders (GIF, WEBP, AVIF, PNG)
//! - The [`MediaToolkit`] capability the worker drives

pub mod analyze;
pub mod command;
pub mod delays;
pub mod detect;
pub mod encode;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod resize;
pub mod toolkit;

pub use command::{check_tool, run_pipe, ToolCommand, ToolOutput};
pub use detect::detect;
pub use encode::EncodeTarget;
pub use error::{MediaError, MediaResult};
pub use toolkit::{check_tools, CliToolkit, MediaToolkit, DEFAULT_AV1_DECODER, DEFAULT_AV1_ENCODER};
