//! Filesystem helpers for task working directories.
//!
//! Directories are created owner-only (0700) and files 0600 on unix.

use std::path::{Path, PathBuf};

use imgproc_models::{OutputFormat, RAW_FILE_STEM};
use tokio::fs;

use crate::error::MediaResult;

/// Create `dir` and any missing parents with mode 0700.
pub async fn create_private_dir(dir: impl AsRef<Path>) -> MediaResult<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir.as_ref()).await?;
    Ok(())
}

/// Write `data` to `path` with mode 0600, replacing any existing file.
pub async fn write_private_file(path: impl AsRef<Path>, data: &[u8]) -> MediaResult<()> {
    let path = path.as_ref();
    fs::write(path, data).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

/// Number of `.png` files directly inside `dir`.
pub async fn count_frames(dir: impl AsRef<Path>) -> MediaResult<usize> {
    let mut entries = fs::read_dir(dir.as_ref()).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some("png")
        {
            count += 1;
        }
    }
    Ok(count)
}

/// Produced artifacts directly inside `dir`, sorted by name.
///
/// Only files whose extension is an output format count. The raw input
/// (`raw.<type>`) and anything under `frames/` are ignored.
pub async fn list_artifacts(dir: impl AsRef<Path>) -> MediaResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir.as_ref()).await?;
    let mut artifacts = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if path.file_stem().and_then(|s| s.to_str()) == Some(RAW_FILE_STEM) {
            continue;
        }
        let is_output = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(OutputFormat::from_extension)
            .is_some();
        if is_output {
            artifacts.push(path);
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_count_frames_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        for name in ["dump_0000.png", "dump_0001.png", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").await.unwrap();
        }
        fs::create_dir(dir.path().join("1x.png")).await.unwrap();

        assert_eq!(count_frames(dir.path()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_artifacts_by_extension() {
        let dir = TempDir::new().unwrap();
        for name in ["raw.gif", "1x.webp", "1x.avif", "1x_static.png", "2x.GIF", "raw.mp4"] {
            fs::write(dir.path().join(name), b"x").await.unwrap();
        }
        create_private_dir(dir.path().join("frames/1x")).await.unwrap();

        let names: Vec<String> = list_artifacts(dir.path())
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["1x.avif", "1x.webp", "1x_static.png", "2x.GIF"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        create_private_dir(&nested).await.unwrap();
        let mode = fs::metadata(&nested).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);

        let file = nested.join("1x.webp");
        write_private_file(&file, b"data").await.unwrap();
        let mode = fs::metadata(&file).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
