//! S3-compatible object store.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::object::{Acl, ObjectStore};

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom endpoint (MinIO, R2, ...); AWS when unset
    pub endpoint_url: Option<String>,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Region
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    ///
    /// Returns `Ok(None)` when `S3_REGION` is unset: the worker then runs
    /// without object storage and only serves local jobs.
    pub fn from_env() -> StorageResult<Option<Self>> {
        let Some(region) = std::env::var("S3_REGION").ok().filter(|r| !r.is_empty()) else {
            return Ok(None);
        };

        Ok(Some(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|u| !u.is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            region,
        }))
    }
}

/// Object store client.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "imgproc",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Create from environment variables; `None` when storage is not configured.
    pub fn from_env() -> StorageResult<Option<Self>> {
        Ok(S3Config::from_env()?.map(Self::new))
    }
}

fn canned_acl(acl: Acl) -> ObjectCannedAcl {
    match acl {
        Acl::Private => ObjectCannedAcl::Private,
        Acl::PublicRead => ObjectCannedAcl::PublicRead,
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: &Path,
        content_type: &str,
        acl: Acl,
        cache_control: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} to {}/{}", body.display(), bucket, key);

        let stream = ByteStream::from_path(body)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{key}: {e}")))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(stream)
            .content_type(content_type)
            .acl(canned_acl(acl))
            .cache_control(cache_control)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{key}: {e}")))?;

        info!("Uploaded {} to {}/{}", body.display(), bucket, key);
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_acl() {
        assert_eq!(canned_acl(Acl::PublicRead), ObjectCannedAcl::PublicRead);
        assert_eq!(canned_acl(Acl::PublicRead).as_str(), Acl::PublicRead.as_str());
        assert_eq!(canned_acl(Acl::Private).as_str(), Acl::Private.as_str());
    }
}
