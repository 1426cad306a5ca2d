//! Prometheus metrics for the worker.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const TASKS_STARTED_TOTAL: &str = "imgproc_tasks_started_total";
    pub const TASKS_COMPLETED_TOTAL: &str = "imgproc_tasks_completed_total";
    pub const TASKS_FAILED_TOTAL: &str = "imgproc_tasks_failed_total";
    pub const TASK_DURATION_SECONDS: &str = "imgproc_task_duration_seconds";
    pub const POOL_ACTIVE_TASKS: &str = "imgproc_pool_active_tasks";
}

/// Serve `/metrics` on `port`. Must be called inside the runtime.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::Io(std::io::Error::other(e.to_string())))?;
    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}

pub fn record_task_started() {
    counter!(names::TASKS_STARTED_TOTAL).increment(1);
}

/// Record a terminal outcome.
pub fn record_task_finished(success: bool, duration: Duration) {
    if success {
        counter!(names::TASKS_COMPLETED_TOTAL).increment(1);
    } else {
        counter!(names::TASKS_FAILED_TOTAL).increment(1);
    }
    let outcome = if success { "completed" } else { "failed" };
    let labels = [("outcome", outcome.to_string())];
    histogram!(names::TASK_DURATION_SECONDS, &labels).record(duration.as_secs_f64());
}

pub fn set_active_tasks(count: usize) {
    gauge!(names::POOL_ACTIVE_TASKS).set(count as f64);
}
