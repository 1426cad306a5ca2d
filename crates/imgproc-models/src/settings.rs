//! Output settings bitmask.

use std::fmt;
use std::ops::BitOr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Bit flags selecting which output variants a job produces.
///
/// A value of zero means "nothing selected" on the wire and is widened to
/// [`Settings::ALL`] by [`Settings::or_all`] before a task is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Settings(pub u64);

impl Settings {
    pub const ANIMATED_GIF: Settings = Settings(1 << 0);
    pub const ANIMATED_WEBP: Settings = Settings(1 << 1);
    pub const ANIMATED_AVIF: Settings = Settings(1 << 2);
    pub const STATIC_WEBP: Settings = Settings(1 << 3);
    pub const STATIC_AVIF: Settings = Settings(1 << 4);
    pub const STATIC_PNG: Settings = Settings(1 << 5);
    pub const ANIMATED: Settings = Settings(1 << 6);
    pub const ANIMATED_THUMBNAILS: Settings = Settings(1 << 7);
    pub const ALL: Settings = Settings((1 << 8) - 1);

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set.
    pub const fn contains(&self, other: Settings) -> bool {
        self.0 & other.0 == other.0
    }

    /// Zero means "everything".
    pub const fn or_all(self) -> Settings {
        if self.is_empty() {
            Settings::ALL
        } else {
            self
        }
    }
}

impl BitOr for Settings {
    type Output = Settings;

    fn bitor(self, rhs: Self) -> Self::Output {
        Settings(self.0 | rhs.0)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010b}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_covers_every_flag() {
        for flag in [
            Settings::ANIMATED_GIF,
            Settings::ANIMATED_WEBP,
            Settings::ANIMATED_AVIF,
            Settings::STATIC_WEBP,
            Settings::STATIC_AVIF,
            Settings::STATIC_PNG,
            Settings::ANIMATED,
            Settings::ANIMATED_THUMBNAILS,
        ] {
            assert!(Settings::ALL.contains(flag));
        }
        assert_eq!(Settings::ALL.bits(), 0xFF);
    }

    #[test]
    fn test_zero_widens_to_all() {
        assert_eq!(Settings(0).or_all(), Settings::ALL);
        assert_eq!(Settings::ANIMATED_WEBP.or_all(), Settings::ANIMATED_WEBP);
    }

    #[test]
    fn test_serde_is_plain_integer() {
        let s = Settings::ANIMATED_GIF | Settings::STATIC_PNG;
        assert_eq!(serde_json::to_string(&s).unwrap(), "33");
        let back: Settings = serde_json::from_str("33").unwrap();
        assert_eq!(back, s);
    }
}
