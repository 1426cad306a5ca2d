//! Job executor: the bounded worker pool behind the job queue.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use imgproc_models::Job;
use imgproc_queue::{Delivery, QueueTransport};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::env::ExecutionEnv;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::publisher::{publish_event, publish_result};
use crate::task::Task;

const STREAM_ERROR_BACKOFF: Duration = Duration::from_secs(1);
const UNWIND_TIMEOUT: Duration = Duration::from_secs(5);

/// Pulls job messages and runs at most `max_concurrent_jobs` tasks at once.
pub struct JobExecutor {
    env: ExecutionEnv,
    queue: Arc<dyn QueueTransport>,
    job_semaphore: Arc<Semaphore>,
    capacity: usize,
    shutdown: tokio::sync::watch::Sender<bool>,
    tasks_scope: CancellationToken,
}

impl JobExecutor {
    pub fn new(env: ExecutionEnv, queue: Arc<dyn QueueTransport>) -> Self {
        let capacity = env.config().max_concurrent_jobs.max(1);
        let (shutdown, _) = tokio::sync::watch::channel(false);
        Self {
            env,
            queue,
            job_semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            shutdown,
            tasks_scope: CancellationToken::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Consume until shutdown is requested or the job stream ends, then wait
    /// for in-flight tasks.
    pub async fn run(&self) -> WorkerResult<()> {
        let config = self.env.config();
        info!(
            "Starting job executor on '{}' with {} max concurrent jobs",
            config.job_queue, self.capacity
        );

        let mut deliveries = self.queue.subscribe(&config.job_queue).await?;
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow_and_update() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            // Wait for a free slot before taking a message off the queue.
            let permit = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                permit = self.job_semaphore.clone().acquire_owned() => permit
                    .map_err(|_| WorkerError::cancelled("job semaphore closed"))?,
            };

            let delivery = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(STREAM_ERROR_BACKOFF).await;
                        continue;
                    }
                    None => {
                        info!("Job stream ended");
                        break;
                    }
                },
            };

            debug!(tag = delivery.tag(), "Consumed job message");
            let env = self.env.clone();
            let queue = Arc::clone(&self.queue);
            let scope = self.tasks_scope.clone();
            let semaphore = Arc::clone(&self.job_semaphore);
            let capacity = self.capacity;
            metrics::set_active_tasks(capacity - semaphore.available_permits());
            tokio::spawn(async move {
                Self::execute_job(env, queue, scope, delivery).await;
                drop(permit);
                metrics::set_active_tasks(capacity - semaphore.available_permits());
            });
        }

        drop(deliveries);

        info!("Waiting for in-flight jobs to complete...");
        let grace = config.shutdown_timeout;
        if tokio::time::timeout(grace, self.wait_for_jobs()).await.is_err() {
            warn!("In-flight jobs still running after {:?}, cancelling them", grace);
            self.tasks_scope.cancel();
            let _ = tokio::time::timeout(UNWIND_TIMEOUT, self.wait_for_jobs()).await;
        }

        metrics::set_active_tasks(0);
        info!("Job executor stopped");
        Ok(())
    }

    /// Run one message to completion: parse, run the task, relay events,
    /// settle the delivery and publish the result.
    async fn execute_job(
        env: ExecutionEnv,
        queue: Arc<dyn QueueTransport>,
        scope: CancellationToken,
        delivery: Delivery,
    ) {
        let config = env.config().clone();

        let job = match serde_json::from_slice::<Job>(delivery.body()) {
            Ok(job) => job.with_defaults(),
            Err(e) => {
                warn!(tag = delivery.tag(), "Bad job message: {}", e);
                if let Err(e) = delivery.reject(false).await {
                    warn!("Failed to reject bad job message: {}", e);
                }
                return;
            }
        };

        let job_id = job.id.clone();
        let task = Task::new(job, &scope, Some(config.max_task_duration));
        let events = task.events();
        info!(job_id = %job_id, task_id = %task.id(), "Starting new task");
        task.start(env);

        if let Some(mut events) = events {
            while let Some(event) = events.recv().await {
                publish_event(&*queue, &config.update_queue, &event).await;
            }
        }
        task.done().await;

        if let Some(err) = task.failed() {
            error!(job_id = %job_id, "Task failed: {}", err);
        }
        publish_result(&*queue, &config.result_queue, &task, delivery).await;
        info!(job_id = %job_id, "Finished task");
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.capacity {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
