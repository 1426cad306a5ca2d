//! In-memory object store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::object::{Acl, ObjectStore};

/// One stored object with the metadata it was uploaded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub acl: Acl,
    pub cache_control: String,
}

/// Object store kept in a map, keyed by `(bucket, key)`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, e.g. a raw input.
    pub fn insert(&self, bucket: &str, key: &str, data: Vec<u8>) {
        let object = StoredObject {
            data,
            content_type: "application/octet-stream".to_string(),
            acl: Acl::Private,
            cache_control: String::new(),
        };
        self.lock().insert((bucket.to_string(), key.to_string()), object);
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock().get(&(bucket.to_string(), key.to_string())).cloned()
    }

    /// Keys stored under `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: &Path,
        content_type: &str,
        acl: Acl,
        cache_control: &str,
    ) -> StorageResult<()> {
        let data = tokio::fs::read(body)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{key}: {e}")))?;
        let object = StoredObject {
            data,
            content_type: content_type.to_string(),
            acl,
            cache_control: cache_control.to_string(),
        };
        self.lock().insert((bucket.to_string(), key.to_string()), object);
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        self.get(bucket, key)
            .map(|o| o.data)
            .ok_or_else(|| StorageError::not_found(format!("{bucket}/{key}")))
    }
}
