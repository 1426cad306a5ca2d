//! Job definitions for queue processing.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelResult;
use crate::format::RAW_FILE_STEM;
use crate::image::FRAMES_DIR;
use crate::provider::{RawProvider, ResultConsumer, StorageKind};
use crate::settings::Settings;

/// Identifier of a job, as supplied by the producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested bounding box of one output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Target aspect ratio (x:y) every frame is padded towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct AspectRatio {
    pub x: u32,
    pub y: u32,
}

impl AspectRatio {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Interpret the wire pair; anything but two non-zero values is 3:1.
    pub fn from_pair(pair: &[u32]) -> Self {
        match pair {
            [x, y] if *x != 0 && *y != 0 => Self::new(*x, *y),
            _ => Self::default(),
        }
    }

    /// Parse the `X:Y` command line form.
    pub fn parse(s: &str) -> Option<Self> {
        let (x, y) = s.split_once(':')?;
        let x: u32 = x.trim().parse().ok()?;
        let y: u32 = y.trim().parse().ok()?;
        (x != 0 && y != 0).then_some(Self::new(x, y))
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::new(3, 1)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

/// Why `name` cannot be used as a size name, if it cannot.
///
/// Size names become file and directory names inside a task's working
/// directory, so separators, dot components and the names the pipeline keeps
/// for itself are refused.
pub fn size_name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("is empty")
    } else if name.contains(['/', '\\']) {
        Some("contains a path separator")
    } else if name == "." || name.contains("..") {
        Some("contains a relative path component")
    } else if name == RAW_FILE_STEM || name == FRAMES_DIR {
        Some("is reserved")
    } else {
        None
    }
}

/// Size table used when a queued job names no sizes.
pub fn default_sizes() -> BTreeMap<String, ImageSize> {
    BTreeMap::from([
        ("1x".to_string(), ImageSize::new(128, 32)),
        ("2x".to_string(), ImageSize::new(256, 64)),
        ("3x".to_string(), ImageSize::new(384, 96)),
        ("4x".to_string(), ImageSize::new(512, 128)),
    ])
}

/// One conversion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Producer supplied job ID
    pub id: JobId,

    /// Target aspect ratio as `[x, y]`
    #[serde(default)]
    pub aspect_ratio_xy: Vec<u32>,

    /// Output sizes keyed by size name
    #[serde(default)]
    pub sizes: BTreeMap<String, ImageSize>,

    /// Output variant bitmask
    #[serde(default)]
    pub settings: Settings,

    /// Where the raw bytes come from
    #[serde(default)]
    pub raw_provider: StorageKind,

    /// Provider specific details, decoded lazily
    #[serde(default)]
    pub raw_provider_details: serde_json::Value,

    /// Where the produced files go
    #[serde(default)]
    pub result_consumer: StorageKind,

    /// Consumer specific details, decoded lazily
    #[serde(default)]
    pub result_consumer_details: serde_json::Value,
}

impl Job {
    /// Effective aspect ratio, defaulting to 3:1.
    pub fn aspect_ratio(&self) -> AspectRatio {
        AspectRatio::from_pair(&self.aspect_ratio_xy)
    }

    /// Apply the queue defaults: 3:1 aspect ratio, all settings, default sizes.
    pub fn with_defaults(mut self) -> Self {
        let ratio = self.aspect_ratio();
        self.aspect_ratio_xy = vec![ratio.x, ratio.y];
        self.settings = self.settings.or_all();
        if self.sizes.is_empty() {
            self.sizes = default_sizes();
        }
        self
    }

    /// Decode the raw provider from its discriminant and details.
    pub fn raw_provider(&self) -> ModelResult<RawProvider> {
        RawProvider::resolve(&self.raw_provider, &self.raw_provider_details)
    }

    /// Decode the result consumer from its discriminant and details.
    pub fn result_consumer(&self) -> ModelResult<ResultConsumer> {
        ResultConsumer::resolve(&self.result_consumer, &self.result_consumer_details)
    }
}
