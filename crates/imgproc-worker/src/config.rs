//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use imgproc_media::{DEFAULT_AV1_DECODER, DEFAULT_AV1_ENCODER};

const DELIVERY_HOLD_MARGIN: Duration = Duration::from_secs(30);

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent tasks
    pub max_concurrent_jobs: usize,
    /// Deadline applied to every queued task
    pub max_task_duration: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Parent of every task working directory
    pub work_dir: PathBuf,
    /// AV1 encoder passed to avifenc
    pub av1_encoder: String,
    /// AV1 decoder passed to avifdump
    pub av1_decoder: String,
    /// Inbound job queue
    pub job_queue: String,
    /// Outbound progress queue
    pub update_queue: String,
    /// Outbound result queue
    pub result_queue: String,
    /// Prometheus exporter port
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: num_cpus::get(),
            max_task_duration: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(60),
            work_dir: PathBuf::from("/tmp/imgproc"),
            av1_encoder: DEFAULT_AV1_ENCODER.to_string(),
            av1_decoder: DEFAULT_AV1_DECODER.to_string(),
            job_queue: "image_processor:jobs".to_string(),
            update_queue: "image_processor:updates".to_string(),
            result_queue: "image_processor:results".to_string(),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            max_task_duration: Duration::from_secs(
                std::env::var("WORKER_MAX_TASK_DURATION")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            av1_encoder: std::env::var("WORKER_AV1_ENCODER").unwrap_or(defaults.av1_encoder),
            av1_decoder: std::env::var("WORKER_AV1_DECODER").unwrap_or(defaults.av1_decoder),
            job_queue: std::env::var("QUEUE_JOB_NAME").unwrap_or(defaults.job_queue),
            update_queue: std::env::var("QUEUE_UPDATE_NAME").unwrap_or(defaults.update_queue),
            result_queue: std::env::var("QUEUE_RESULT_NAME").unwrap_or(defaults.result_queue),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Longest a delivery can stay unacknowledged while this worker still
    /// owns it: the task deadline plus the shutdown grace and unwind time.
    pub fn max_delivery_hold(&self) -> Duration {
        self.max_task_duration + self.shutdown_timeout + DELIVERY_HOLD_MARGIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert!(config.max_concurrent_jobs >= 1);
        assert_eq!(config.max_task_duration, Duration::from_secs(300));
        assert_eq!(config.av1_encoder, "rav1e");
        assert_eq!(config.av1_decoder, "dav1d");
        assert!(config.metrics_port.is_none());
        assert_eq!(config.max_delivery_hold(), Duration::from_secs(390));
    }
}
