//! Outbound messages: progress updates and terminal results.

use imgproc_models::{ResultMessage, TaskEvent};
use imgproc_queue::{Delivery, DeliveryMode, QueueTransport, CONTENT_TYPE_JSON};
use tracing::{error, warn};

use crate::error::WorkerResult;
use crate::task::Task;

/// Result message for a finished task.
pub fn result_message(task: &Task) -> ResultMessage {
    let job_id = task.job().id.clone();
    match task.failed() {
        Some(err) => ResultMessage::failure(job_id, err.to_string()),
        None => ResultMessage::success(job_id, task.files()),
    }
}

/// Relay one task event as a transient update. Failures are logged.
pub async fn publish_event(queue: &dyn QueueTransport, update_queue: &str, event: &TaskEvent) {
    let body = match serde_json::to_vec(event) {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to encode update for job {}: {}", event.job_id, e);
            return;
        }
    };
    if let Err(e) = queue
        .publish(update_queue, CONTENT_TYPE_JSON, DeliveryMode::Transient, &body)
        .await
    {
        warn!("Failed to send update for job {}: {}", event.job_id, e);
    }
}

/// Settle the triggering delivery (ack on success, reject without requeue on
/// failure) and publish the result. Nothing is retried.
pub async fn publish_result(
    queue: &dyn QueueTransport,
    result_queue: &str,
    task: &Task,
    delivery: Delivery,
) -> ResultMessage {
    let message = result_message(task);

    let settled = if message.success {
        delivery.ack().await
    } else {
        delivery.reject(false).await
    };
    if let Err(e) = settled {
        warn!("Failed to settle job {}: {}", message.job_id, e);
    }

    if let Err(e) = send_result(queue, result_queue, &message).await {
        error!("Failed to publish result for job {}: {}", message.job_id, e);
    }
    message
}

async fn send_result(
    queue: &dyn QueueTransport,
    result_queue: &str,
    message: &ResultMessage,
) -> WorkerResult<()> {
    let body = serde_json::to_vec(message)?;
    queue
        .publish(result_queue, CONTENT_TYPE_JSON, DeliveryMode::Persistent, &body)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{env_with, local_job, sizes, MockToolkit, GIF_BYTES};
    use futures::StreamExt;
    use imgproc_models::{JobId, Settings, TaskEventType};
    use imgproc_queue::{Disposition, MemoryQueue};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    async fn finished_task(dir: &TempDir, data: &[u8]) -> Task {
        let input = dir.path().join("input");
        tokio::fs::write(&input, data).await.unwrap();
        let job = local_job(
            "job-7",
            &input,
            &dir.path().join("out"),
            Settings::STATIC_PNG,
            sizes(&[("1x", 96, 32)]),
        );
        let task = Task::new(job, &CancellationToken::new(), None);
        task.start(env_with(MockToolkit::still(), &dir.path().join("work")));
        task.done().await;
        task
    }

    #[tokio::test]
    async fn test_success_acks_and_publishes_files() {
        let dir = TempDir::new().unwrap();
        let task = finished_task(&dir, GIF_BYTES).await;

        let queue = MemoryQueue::new();
        let tag = queue.push("jobs", "{}");
        let delivery = queue.subscribe("jobs").await.unwrap().next().await.unwrap().unwrap();

        let message = publish_result(&queue, "results", &task, delivery).await;
        assert!(message.success);
        assert_eq!(message.error, "");
        assert_eq!(message.files[0].name, "1x.png");

        assert_eq!(queue.dispositions(), vec![(tag, Disposition::Ack)]);
        let published = queue.published("results");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].mode, DeliveryMode::Persistent);
        let decoded: ResultMessage = serde_json::from_slice(&published[0].body).unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn test_failure_rejects_without_requeue() {
        let dir = TempDir::new().unwrap();
        let task = finished_task(&dir, b"garbage").await;

        let queue = MemoryQueue::new();
        let tag = queue.push("jobs", "{}");
        let delivery = queue.subscribe("jobs").await.unwrap().next().await.unwrap().unwrap();

        let message = publish_result(&queue, "results", &task, delivery).await;
        assert!(!message.success);
        assert!(message.files.is_empty());
        assert_eq!(message.error, "unknown image format");
        assert_eq!(
            queue.dispositions(),
            vec![(tag, Disposition::Reject { requeue: false })]
        );
    }

    #[tokio::test]
    async fn test_update_is_transient_json() {
        let queue = MemoryQueue::new();
        let event = TaskEvent::new(JobId::from_string("j"), TaskEventType::StageOne);
        publish_event(&queue, "updates", &event).await;

        let published = queue.published("updates");
        assert_eq!(published[0].mode, DeliveryMode::Transient);
        assert_eq!(published[0].content_type, "application/json");
        let json: serde_json::Value = serde_json::from_slice(&published[0].body).unwrap();
        assert_eq!(json["type"], "stage-one");
    }
}
