//! Task progress events.
//!
//! Each event is published as-is on the update queue.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Kind of a task event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TaskEventType {
    Started,
    Downloaded,
    Failed,
    Completed,
    Stopped,
    Cleaned,
    StageOne,
    StageOneComplete,
    StageTwo,
    StageTwoComplete,
    StageThree,
    StageThreeComplete,
}

impl TaskEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventType::Started => "started",
            TaskEventType::Downloaded => "downloaded",
            TaskEventType::Failed => "failed",
            TaskEventType::Completed => "completed",
            TaskEventType::Stopped => "stopped",
            TaskEventType::Cleaned => "cleaned",
            TaskEventType::StageOne => "stage-one",
            TaskEventType::StageOneComplete => "stage-one-complete",
            TaskEventType::StageTwo => "stage-two",
            TaskEventType::StageTwoComplete => "stage-two-complete",
            TaskEventType::StageThree => "stage-three",
            TaskEventType::StageThreeComplete => "stage-three-complete",
        }
    }

    /// Failed or Completed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEventType::Failed | TaskEventType::Completed)
    }
}

/// One entry of a task's event stream; also the update message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaskEvent {
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub event_type: TaskEventType,
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    pub fn new(job_id: JobId, event_type: TaskEventType) -> Self {
        Self {
            job_id,
            event_type,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_message_shape() {
        let event = TaskEvent::new(JobId::from_string("abc"), TaskEventType::StageTwoComplete);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["job_id"], "abc");
        assert_eq!(json["type"], "stage-two-complete");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_as_str_matches_serde() {
        for t in [
            TaskEventType::Started,
            TaskEventType::Downloaded,
            TaskEventType::StageOneComplete,
            TaskEventType::Cleaned,
        ] {
            assert_eq!(serde_json::to_value(t).unwrap(), t.as_str());
        }
    }
}
