//! Tracing setup and structured task logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use imgproc_models::JobId;

/// Install the global subscriber: colored output for dev, JSON when
/// `LOG_FORMAT=json`. `RUST_LOG` directives are honored on top of
/// `imgproc=info`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "imgproc=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Logger carrying a job id and the task run it belongs to.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    task_id: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, task_id: impl ToString) -> Self {
        Self {
            job_id: job_id.to_string(),
            task_id: task_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, task_id = %self.task_id, "Task started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, task_id = %self.task_id, "Task progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, task_id = %self.task_id, "Task warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, task_id = %self.task_id, "Task error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, task_id = %self.task_id, "Task completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Span wrapping one task run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("task", job_id = %self.job_id, task_id = %self.task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let logger = JobLogger::new(&JobId::from_string("job-123"), "7f0c");
        assert_eq!(logger.job_id(), "job-123");
        assert_eq!(logger.task_id(), "7f0c");
    }
}
