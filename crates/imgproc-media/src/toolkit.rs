//! Media toolkit capability.
//!
//! The worker drives the three stages through [`MediaToolkit`] so the task
//! state machine can be tested without the external tools installed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use imgproc_models::{AspectRatio, ContainerType, Image, ImageSize};
use tokio_util::sync::CancellationToken;

use crate::analyze::analyze;
use crate::command::check_tool;
use crate::encode::{encode, EncodeTarget};
use crate::error::{MediaError, MediaResult};
use crate::resize::resize;

/// Default AV1 encoder passed to `avifenc --codec`.
pub const DEFAULT_AV1_ENCODER: &str = "rav1e";
/// Default AV1 decoder passed to `avifdump --codec`.
pub const DEFAULT_AV1_DECODER: &str = "dav1d";

/// Every external program [`CliToolkit`] may run.
pub const REQUIRED_TOOLS: &[&str] = &[
    "ffmpeg",
    "ffprobe",
    "gifsicle",
    "gifski",
    "webpmux",
    "anim_dump",
    "img2webp",
    "cwebp",
    "avifdump",
    "avifenc",
    "vipsthumbnail",
    "optipng",
];

/// The three pipeline stages.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Stage one: write padded frames next to `raw` and report timing.
    async fn analyze(
        &self,
        raw: &Path,
        container: ContainerType,
        aspect_ratio: AspectRatio,
        cancel: &CancellationToken,
    ) -> MediaResult<Image>;

    /// Stage two, one size.
    async fn resize(
        &self,
        image: &Image,
        size_name: &str,
        size: ImageSize,
        cancel: &CancellationToken,
    ) -> MediaResult<()>;

    /// Stage three, one output file. Returns the written path.
    async fn encode(
        &self,
        image: &Image,
        target: &EncodeTarget,
        cancel: &CancellationToken,
    ) -> MediaResult<PathBuf>;
}

/// Toolkit backed by the command line tools.
#[derive(Debug, Clone)]
pub struct CliToolkit {
    av1_encoder: String,
    av1_decoder: String,
}

impl Default for CliToolkit {
    fn default() -> Self {
        Self::new(DEFAULT_AV1_ENCODER, DEFAULT_AV1_DECODER)
    }
}

impl CliToolkit {
    pub fn new(av1_encoder: impl Into<String>, av1_decoder: impl Into<String>) -> Self {
        Self {
            av1_encoder: av1_encoder.into(),
            av1_decoder: av1_decoder.into(),
        }
    }

    pub fn av1_encoder(&self) -> &str {
        &self.av1_encoder
    }

    pub fn av1_decoder(&self) -> &str {
        &self.av1_decoder
    }
}

#[async_trait]
impl MediaToolkit for CliToolkit {
    async fn analyze(
        &self,
        raw: &Path,
        container: ContainerType,
        aspect_ratio: AspectRatio,
        cancel: &CancellationToken,
    ) -> MediaResult<Image> {
        analyze(raw, container, aspect_ratio, &self.av1_decoder, cancel).await
    }

    async fn resize(
        &self,
        image: &Image,
        size_name: &str,
        size: ImageSize,
        cancel: &CancellationToken,
    ) -> MediaResult<()> {
        resize(image, size_name, size, cancel).await
    }

    async fn encode(
        &self,
        image: &Image,
        target: &EncodeTarget,
        cancel: &CancellationToken,
    ) -> MediaResult<PathBuf> {
        encode(image, target, &self.av1_encoder, cancel).await
    }
}

/// Locate every required tool; the error lists all missing ones.
pub fn check_tools() -> MediaResult<Vec<PathBuf>> {
    let mut found = Vec::with_capacity(REQUIRED_TOOLS.len());
    let mut missing = Vec::new();
    for tool in REQUIRED_TOOLS {
        match check_tool(tool) {
            Ok(path) => found.push(path),
            Err(_) => missing.push(*tool),
        }
    }
    if missing.is_empty() {
        Ok(found)
    } else {
        Err(MediaError::ToolNotFound(missing.join(", ")))
    }
}
