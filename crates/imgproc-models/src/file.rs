//! Produced file records.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata about one artifact produced by stage three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct File {
    /// File name, e.g. `2x.webp` or `2x_static.png`
    pub name: String,
    /// MIME type
    pub content_type: String,
    /// Size in bytes
    pub size: u64,
    /// Whether the artifact holds more than one frame
    pub animated: bool,
    /// Width in pixels, scaled from the canonical image
    pub width: u32,
    /// Height in pixels, the requested size height
    pub height: u32,
    /// Elapsed time since the encode stage started, in nanoseconds on the wire
    #[serde(with = "duration_nanos")]
    #[schemars(with = "u64")]
    pub time_taken: Duration,
}

mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_nanos().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_taken_is_nanoseconds() {
        let file = File {
            name: "1x.webp".into(),
            content_type: "image/webp".into(),
            size: 1234,
            animated: true,
            width: 96,
            height: 32,
            time_taken: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["time_taken"], 1_500_000_000u64);
        assert_eq!(json["content_type"], "image/webp");
    }
}
