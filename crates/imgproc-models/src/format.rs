//! Input container types and output formats.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stem of the persisted raw input (`raw.<type>`).
pub const RAW_FILE_STEM: &str = "raw";

/// Container type of a raw input, as recognised by the format detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    Avi,
    Avif,
    Flv,
    Gif,
    Jpeg,
    Mp4,
    Png,
    Tiff,
    Webm,
    Webp,
    Mov,
}

impl ContainerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::Avi => "avi",
            ContainerType::Avif => "avif",
            ContainerType::Flv => "flv",
            ContainerType::Gif => "gif",
            ContainerType::Jpeg => "jpeg",
            ContainerType::Mp4 => "mp4",
            ContainerType::Png => "png",
            ContainerType::Tiff => "tiff",
            ContainerType::Webm => "webm",
            ContainerType::Webp => "webp",
            ContainerType::Mov => "mov",
        }
    }

    /// File name the raw input is persisted under inside a task's working directory.
    pub fn raw_file_name(&self) -> String {
        format!("{RAW_FILE_STEM}.{}", self.as_str())
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final artifact format produced by stage three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Gif,
    Webp,
    Avif,
    Png,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Gif,
        OutputFormat::Webp,
        OutputFormat::Avif,
        OutputFormat::Png,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "gif",
            OutputFormat::Webp => "webp",
            OutputFormat::Avif => "avif",
            OutputFormat::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "image/gif",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Avif => "image/avif",
            OutputFormat::Png => "image/png",
        }
    }

    /// Match an artifact extension (without the dot, case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
