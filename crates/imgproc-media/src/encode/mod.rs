//! Stage three encoders.
//!
//! One [`EncodeTarget`] is one output file. Encoders read the resized frames
//! from `frames/<size>/` and write `<working_dir>/<size>[_static].<ext>`.

pub mod avif;
pub mod gif;
pub mod png;
pub mod webp;

use std::path::PathBuf;

use imgproc_models::{Image, OutputFormat};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::MediaResult;

/// Suffix of first-frame thumbnails of animated content.
pub const STATIC_SUFFIX: &str = "_static";

/// One requested output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodeTarget {
    pub size_name: String,
    pub format: OutputFormat,
    /// Encode only the first frame of animated content
    pub thumbnail: bool,
}

impl EncodeTarget {
    pub fn new(size_name: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            size_name: size_name.into(),
            format,
            thumbnail: false,
        }
    }

    pub fn thumbnail(size_name: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            thumbnail: true,
            ..Self::new(size_name, format)
        }
    }

    /// Output name without extension, e.g. `2x` or `2x_static`.
    pub fn output_name(&self) -> String {
        if self.thumbnail {
            format!("{}{}", self.size_name, STATIC_SUFFIX)
        } else {
            self.size_name.clone()
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.output_name(), self.format.extension())
    }

    pub fn output_path(&self, image: &Image) -> PathBuf {
        image.artifact_path(&self.file_name())
    }

    /// Frame delays this target encodes.
    pub fn delays<'a>(&self, image: &'a Image) -> &'a [u32] {
        if self.thumbnail {
            &image.delays[..image.delays.len().min(1)]
        } else {
            &image.delays
        }
    }

    /// Whether the produced file holds more than one frame.
    pub fn is_animated(&self, image: &Image) -> bool {
        self.format != OutputFormat::Png && self.delays(image).len() > 1
    }
}

/// Produce `target` from the resized frames of `image`.
pub async fn encode(
    image: &Image,
    target: &EncodeTarget,
    av1_encoder: &str,
    cancel: &CancellationToken,
) -> MediaResult<PathBuf> {
    debug!(file = %target.file_name(), "Encoding");
    match target.format {
        OutputFormat::Gif => gif::encode(image, target, cancel).await?,
        OutputFormat::Webp => webp::encode(image, target, cancel).await?,
        OutputFormat::Avif => avif::encode(image, target, av1_encoder, cancel).await?,
        OutputFormat::Png => png::encode(image, target, cancel).await?,
    }
    Ok(target.output_path(image))
}
