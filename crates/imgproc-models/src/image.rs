//! Canonical image produced by stage one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::job::ImageSize;

/// Name of the per-task directory holding extracted frames.
pub const FRAMES_DIR: &str = "frames";

/// A normalized frame sequence on disk.
///
/// Frames live at `<working_dir>/frames/dump_NNNN.png`; stage two writes each
/// size's resized copy to `<working_dir>/frames/<size>/dump_NNNN.png`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Task working directory
    pub working_dir: PathBuf,
    /// Width after padding
    pub width: u32,
    /// Height after padding
    pub height: u32,
    /// Per-frame delays in centiseconds, one per frame
    pub delays: Vec<u32>,
}

impl Image {
    pub fn frame_count(&self) -> usize {
        self.delays.len()
    }

    pub fn is_animated(&self) -> bool {
        self.delays.len() > 1
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.working_dir.join(FRAMES_DIR)
    }

    /// Directory holding the frames resized for `size_name`.
    pub fn size_dir(&self, size_name: &str) -> PathBuf {
        self.frames_dir().join(size_name)
    }

    /// Path of one resized frame.
    pub fn size_frame(&self, size_name: &str, index: usize) -> PathBuf {
        self.size_dir(size_name).join(frame_file_name(index))
    }

    /// Path of an artifact written next to the frames directory.
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.working_dir.join(file_name)
    }

    /// Output width for a requested size, keeping the canonical aspect ratio.
    pub fn scaled_width(&self, size: ImageSize) -> u32 {
        if self.height == 0 {
            return 0;
        }
        (size.height as f64 / self.height as f64 * self.width as f64).round() as u32
    }
}

/// `dump_0000.png`, `dump_0001.png`, ...
pub fn frame_file_name(index: usize) -> String {
    format!("dump_{:04}.png", index)
}

/// printf-style pattern matching [`frame_file_name`], as ffmpeg expects it.
pub fn frame_pattern(dir: &Path) -> PathBuf {
    dir.join("dump_%04d.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(width: u32, height: u32, frames: usize) -> Image {
        Image {
            working_dir: PathBuf::from("/work/task"),
            width,
            height,
            delays: vec![10; frames],
        }
    }

    #[test]
    fn test_scaled_width_rounds() {
        let img = image(300, 100, 1);
        assert_eq!(img.scaled_width(ImageSize::new(128, 32)), 96);

        let img = image(100, 30, 1);
        assert_eq!(img.scaled_width(ImageSize::new(128, 32)), 107);
    }

    #[test]
    fn test_paths() {
        let img = image(1, 1, 3);
        assert!(img.is_animated());
        assert_eq!(
            img.size_frame("2x", 12),
            PathBuf::from("/work/task/frames/2x/dump_0012.png")
        );
        assert_eq!(
            frame_pattern(&img.frames_dir()),
            PathBuf::from("/work/task/frames/dump_%04d.png")
        );
    }
}
