//! Task: one pipeline run for one job.
//!
//! ```text
//! Created -> Started -> { Completed | Failed } -> Cleaned
//! ```
//!
//! The run body is a chain of `?`-propagating steps whose single `Result`
//! feeds [`Task::finish`], so exactly one terminal event is emitted however
//! the body ends (error, cancellation, deadline or panic). Cleanup follows,
//! then the event channel is closed and [`Task::done`] resolves.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::FutureExt;
use imgproc_media::detect;
use imgproc_media::fs_utils::{create_private_dir, list_artifacts, write_private_file};
use imgproc_models::{File, Job, TaskEvent, TaskEventType};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::env::ExecutionEnv;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{panic_message, stage_one, stage_three, stage_two};
use crate::provider::{deliver, fetch_raw};

/// Receiving side of a task's event stream.
pub type TaskEvents = mpsc::UnboundedReceiver<TaskEvent>;

/// Why the scope was cancelled, when the task did it itself.
#[derive(Debug, Clone, Copy)]
enum CancelReason {
    Stopped,
    Deadline(Duration),
}

#[derive(Default)]
struct TaskState {
    started: bool,
    stopped: bool,
    completed: bool,
    failure: Option<Arc<WorkerError>>,
    files: Vec<File>,
    dir: Option<PathBuf>,
    cancel_reason: Option<CancelReason>,
    events: Option<mpsc::UnboundedSender<TaskEvent>>,
}

struct TaskInner {
    id: Uuid,
    job: Job,
    parent: CancellationToken,
    scope: CancellationToken,
    deadline: Option<Duration>,
    logger: JobLogger,
    state: Mutex<TaskState>,
    receiver: Mutex<Option<TaskEvents>>,
    done: watch::Sender<bool>,
}

/// Mutable runtime wrapper around one [`Job`]. Cheap to clone.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    /// The task scope is a child of `parent`; cancelling `parent` (process
    /// shutdown) cancels the task. `deadline` bounds the run once started.
    pub fn new(job: Job, parent: &CancellationToken, deadline: Option<Duration>) -> Self {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let (done, _) = watch::channel(false);
        let logger = JobLogger::new(&job.id, id);
        Self {
            inner: Arc::new(TaskInner {
                id,
                job,
                parent: parent.clone(),
                scope: parent.child_token(),
                deadline,
                logger,
                state: Mutex::new(TaskState {
                    events: Some(tx),
                    ..TaskState::default()
                }),
                receiver: Mutex::new(Some(rx)),
                done,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn job(&self) -> &Job {
        &self.inner.job
    }

    /// Cancellation scope every operation of this task observes.
    pub fn scope(&self) -> CancellationToken {
        self.inner.scope.clone()
    }

    /// Take the event stream. Only the first caller gets it.
    pub fn events(&self) -> Option<TaskEvents> {
        self.inner
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn started(&self) -> bool {
        self.state().started
    }

    pub fn stopped(&self) -> bool {
        self.state().stopped
    }

    pub fn completed(&self) -> bool {
        self.state().completed
    }

    /// Terminal error, if the task failed.
    pub fn failed(&self) -> Option<Arc<WorkerError>> {
        self.state().failure.clone()
    }

    /// Produced files; empty unless the task completed without failure.
    pub fn files(&self) -> Vec<File> {
        let state = self.state();
        if state.completed && state.failure.is_none() {
            state.files.clone()
        } else {
            Vec::new()
        }
    }

    /// Resolves once the terminal state and cleanup are reached.
    pub async fn done(&self) {
        let mut rx = self.inner.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Launch the run on the runtime. No-op unless the task is fresh.
    pub fn start(&self, env: ExecutionEnv) {
        {
            let mut state = self.state();
            if state.started || state.stopped || state.completed {
                return;
            }
            state.started = true;
        }

        let task = self.clone();
        let span = self.inner.logger.create_span();
        tokio::spawn(async move { task.run(env).await }.instrument(span));
    }

    /// Emit `Stopped` and cancel the scope. A running task unwinds through
    /// its terminal branch; a task that never started is closed right away.
    pub fn stop(&self) {
        let never_started = {
            let mut state = self.state();
            send(&state, &self.inner.job, TaskEventType::Stopped);
            state.stopped = true;
            if !state.completed {
                state.cancel_reason.get_or_insert(CancelReason::Stopped);
            }
            if state.started {
                false
            } else {
                state.events = None;
                true
            }
        };
        self.inner.scope.cancel();
        if never_started {
            self.inner.done.send_replace(true);
        }
    }

    fn state(&self) -> MutexGuard<'_, TaskState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event_type: TaskEventType) {
        send(&self.state(), &self.inner.job, event_type);
    }

    async fn run(self, env: ExecutionEnv) {
        let logger = self.inner.logger.clone();
        let started_at = Instant::now();
        metrics::record_task_started();
        logger.log_start(&format!("{} sizes, settings {}", self.inner.job.sizes.len(), self.inner.job.settings));

        let body = std::panic::AssertUnwindSafe(self.execute(&env)).catch_unwind();
        tokio::pin!(body);

        let outcome = match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    outcome = &mut body => outcome,
                    _ = tokio::time::sleep(deadline) => {
                        self.state().cancel_reason.get_or_insert(CancelReason::Deadline(deadline));
                        self.inner.scope.cancel();
                        body.await
                    }
                }
            }
            None => body.await,
        };

        let result = outcome.unwrap_or_else(|payload| {
            let message = panic_message(payload);
            logger.log_error(&format!("panic in run body: {message}"));
            Err(WorkerError::Panic(message))
        });

        let success = self.finish(result);
        metrics::record_task_finished(success, started_at.elapsed());

        self.cleanup().await;
        self.state().events = None;
        self.inner.done.send_replace(true);
    }

    async fn execute(&self, env: &ExecutionEnv) -> WorkerResult<Vec<File>> {
        let job = &self.inner.job;
        let cancel = &self.inner.scope;
        let logger = &self.inner.logger;
        let toolkit = env.toolkit();

        self.emit(TaskEventType::Started);

        let data = fetch_raw(env, job, cancel).await?;
        self.emit(TaskEventType::Downloaded);

        if cancel.is_cancelled() {
            return Err(WorkerError::cancelled("cancelled after download"));
        }

        let container = detect(&data).map_err(|_| WorkerError::FormatDetection)?;
        logger.log_progress(&format!("detected {container}, {} bytes", data.len()));

        let dir = env.config().work_dir.join(self.inner.id.to_string());
        create_private_dir(&dir).await?;
        self.state().dir = Some(dir.clone());

        let raw = dir.join(container.raw_file_name());
        write_private_file(&raw, &data).await?;
        drop(data);

        self.emit(TaskEventType::StageOne);
        let image = stage_one(&*toolkit, &raw, container, job.aspect_ratio(), cancel).await?;
        self.emit(TaskEventType::StageOneComplete);

        self.emit(TaskEventType::StageTwo);
        stage_two(toolkit.clone(), &image, &job.sizes, cancel).await?;
        self.emit(TaskEventType::StageTwoComplete);

        self.emit(TaskEventType::StageThree);
        let files = stage_three(toolkit, &image, &job.sizes, job.settings, cancel).await?;
        self.emit(TaskEventType::StageThreeComplete);

        let artifacts = list_artifacts(&dir).await?;
        deliver(env, job, &artifacts, cancel).await?;

        Ok(files)
    }

    /// The single terminal transition. Returns whether the task succeeded.
    fn finish(&self, result: WorkerResult<Vec<File>>) -> bool {
        let mut state = self.state();
        state.completed = true;

        let success = match result {
            Ok(files) => {
                state.files = files;
                state.failure = None;
                true
            }
            Err(e) => {
                let e = self.cancellation_cause(&state, e);
                self.inner.logger.log_error(&e.to_string());
                state.failure = Some(Arc::new(e));
                false
            }
        };

        self.inner.scope.cancel();
        if success {
            send(&state, &self.inner.job, TaskEventType::Completed);
            self.inner.logger.log_completion(&format!("{} files", state.files.len()));
        } else {
            send(&state, &self.inner.job, TaskEventType::Failed);
        }
        success
    }

    /// Replace an error raised by a cancelled scope with why it was cancelled.
    fn cancellation_cause(&self, state: &TaskState, e: WorkerError) -> WorkerError {
        if !self.inner.scope.is_cancelled() {
            return e;
        }
        match state.cancel_reason {
            Some(CancelReason::Deadline(d)) => WorkerError::Timeout(d),
            Some(CancelReason::Stopped) => WorkerError::cancelled("stopped"),
            None if self.inner.parent.is_cancelled() => WorkerError::cancelled("shutdown"),
            None => e,
        }
    }

    /// Emit `Cleaned`, cancel the scope and remove the working directory.
    /// Failures are logged only.
    async fn cleanup(&self) {
        let dir = {
            let mut state = self.state();
            if !state.started {
                return;
            }
            send(&state, &self.inner.job, TaskEventType::Cleaned);
            state.dir.take()
        };
        self.inner.scope.cancel();

        if let Some(dir) = dir {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => self
                    .inner
                    .logger
                    .log_warning(&format!("failed to remove {}: {}", dir.display(), e)),
            }
        }
    }
}

fn send(state: &TaskState, job: &Job, event_type: TaskEventType) {
    if let Some(tx) = &state.events {
        let _ = tx.send(TaskEvent::new(job.id.clone(), event_type));
    }
}
