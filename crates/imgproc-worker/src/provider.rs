//! Raw input retrieval and result delivery.

use std::path::{Path, PathBuf};

use imgproc_models::{Job, OutputFormat, RawProvider, ResultConsumer};
use imgproc_storage::{object_key, Acl, DEFAULT_CACHE_CONTROL};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::env::ExecutionEnv;
use crate::error::{Stage, StageError, WorkerError, WorkerResult};
use crate::pipeline::FanOut;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Fetch the raw input named by the job's provider.
pub async fn fetch_raw(
    env: &ExecutionEnv,
    job: &Job,
    cancel: &CancellationToken,
) -> WorkerResult<Vec<u8>> {
    let data = match job.raw_provider()? {
        RawProvider::Aws { bucket, key } => {
            let store = env
                .object_store()
                .ok_or_else(|| WorkerError::provider("object storage is not configured"))?;
            tokio::select! {
                _ = cancel.cancelled() => return Err(WorkerError::cancelled("download interrupted")),
                data = store.download(&bucket, &key) => data?,
            }
        }
        RawProvider::Local { path } => env.local().read(&path).await?,
    };
    debug!(bytes = data.len(), "Fetched raw input");
    Ok(data)
}

fn content_type(path: &Path) -> &'static str {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(OutputFormat::from_extension)
        .map(|f| f.content_type())
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}

fn file_name(path: &Path) -> WorkerResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| WorkerError::provider(format!("bad artifact path {}", path.display())))
}

/// Hand every artifact to the job's result consumer.
///
/// Object storage uploads run concurrently and every failed upload is
/// reported. Local delivery copies into the folder one file at a time.
pub async fn deliver(
    env: &ExecutionEnv,
    job: &Job,
    artifacts: &[PathBuf],
    cancel: &CancellationToken,
) -> WorkerResult<()> {
    match job.result_consumer()? {
        ResultConsumer::Aws { bucket, key_folder } => {
            let store = env
                .object_store()
                .ok_or_else(|| WorkerError::provider("object storage is not configured"))?;

            let mut units = FanOut::new();
            for path in artifacts {
                let name = file_name(path)?;
                let key = object_key(&key_folder, &name);
                let store = store.clone();
                let bucket = bucket.clone();
                let path = path.clone();
                units.spawn(name, async move {
                    store
                        .upload(
                            &bucket,
                            &key,
                            &path,
                            content_type(&path),
                            Acl::PublicRead,
                            DEFAULT_CACHE_CONTROL,
                        )
                        .await?;
                    Ok(())
                });
            }

            let mut errors = StageError::new(Stage::Deliver);
            for (name, result) in units.drain(cancel).await? {
                if let Err(e) = result {
                    errors.push(name, e);
                }
            }
            errors.into_result()?;
            info!(bucket = %bucket, folder = %key_folder, files = artifacts.len(), "Uploaded results");
        }
        ResultConsumer::Local { path_folder } => {
            for path in artifacts {
                if cancel.is_cancelled() {
                    return Err(WorkerError::cancelled("delivery interrupted"));
                }
                env.local().copy_into(path, &path_folder).await?;
            }
            info!(folder = %path_folder.display(), files = artifacts.len(), "Copied results");
        }
    }
    Ok(())
}
