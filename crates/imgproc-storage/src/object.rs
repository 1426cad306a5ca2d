//! Object storage capability.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Cache-Control sent with every produced file (180 days).
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=15552000";

/// Canned ACL applied on upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acl {
    Private,
    #[default]
    PublicRead,
}

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket/key addressed blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `body` to `bucket/key`.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: &Path,
        content_type: &str,
        acl: Acl,
        cache_control: &str,
    ) -> StorageResult<()>;

    /// Fetch the whole object.
    async fn download(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;
}

/// Join a key folder and a file name with exactly one `/`.
pub fn object_key(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}
