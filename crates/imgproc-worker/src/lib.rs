//! Image conversion worker.
//!
//! This crate provides:
//! - The per-job task state machine and its three-stage pipeline
//! - Raw input retrieval and result delivery
//! - The bounded job executor behind the job queue
//! - Progress and result publishing
//! - One-shot local conversion for the command line

pub mod config;
pub mod env;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod oneshot;
pub mod pipeline;
pub mod provider;
pub mod publisher;
pub mod task;

#[cfg(test)]
mod test_support;

pub use config::WorkerConfig;
pub use env::ExecutionEnv;
pub use error::{Stage, StageCause, StageError, WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::{init_tracing, JobLogger};
pub use oneshot::build_job;
pub use publisher::{publish_event, publish_result, result_message};
pub use task::{Task, TaskEvents};
