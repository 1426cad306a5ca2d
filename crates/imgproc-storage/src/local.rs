//! Local filesystem provider and consumer.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Reads raw inputs from and writes produced files to local folders.
///
/// Folders are created with mode 0700 and files written 0600 on unix.
#[derive(Debug, Clone, Default)]
pub struct LocalStore;

impl LocalStore {
    pub fn new() -> Self {
        Self
    }

    /// Read a whole file.
    pub async fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
        debug!("Reading {}", path.display());
        fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::not_found(path.display().to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    /// Copy `source` into `folder`, keeping its file name.
    pub async fn copy_into(&self, source: &Path, folder: &Path) -> StorageResult<PathBuf> {
        let name = source
            .file_name()
            .ok_or_else(|| StorageError::InvalidKey(source.display().to_string()))?;
        create_private_dir(folder).await?;

        let data = fs::read(source).await?;
        let target = folder.join(name);
        write_private(&target, &data).await?;
        debug!("Copied {} to {}", source.display(), target.display());
        Ok(target)
    }
}

async fn create_private_dir(dir: &Path) -> StorageResult<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await?;
    Ok(())
}

async fn write_private(path: &Path, data: &[u8]) -> StorageResult<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, data).await?;
    tokio::io::AsyncWriteExt::flush(&mut file).await?;
    Ok(())
}
