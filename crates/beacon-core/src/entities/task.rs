use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Entity, EntityKind, merge_field, merge_optional};
use crate::ids::{TaskId, WorkerId, WorkflowId};

/// Task lifecycle status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet queued.
    #[default]
    Pending,
    /// Waiting for a worker.
    Queued,
    /// Allocated to a worker.
    Assigned,
    /// Executing.
    Running,
    /// Suspended by a user.
    Paused,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped before completion.
    Cancelled,
}

impl TaskStatus {
    /// Whether no further transitions are expected.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Scheduling priority.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// Ahead of medium.
    High,
    /// Ahead of everything.
    Critical,
}

/// A scheduled unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable ID.
    pub id: TaskId,
    /// Display title.
    pub title: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Scheduling priority.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Completion percentage (0–100) while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Worker the task is allocated to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    /// Workflow the task belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last server-side modification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Time the task reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A pending task with only the required fields.
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            progress: None,
            worker_id: None,
            workflow_id: None,
            error: None,
            result: None,
            created_at: None,
            updated_at: None,
            completed_at: None,
        }
    }
}

/// Fields changed by a `task_updated` event (or derived from a status/progress event).
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    /// A patch that only moves the status.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

impl Entity for Task {
    type Id = TaskId;
    type Patch = TaskPatch;

    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> &TaskId {
        &self.id
    }

    fn apply_patch(&mut self, patch: &TaskPatch) {
        merge_field(&mut self.title, patch.title.as_ref());
        merge_optional(&mut self.description, patch.description.as_ref());
        merge_field(&mut self.status, patch.status.as_ref());
        merge_field(&mut self.priority, patch.priority.as_ref());
        merge_optional(&mut self.progress, patch.progress.as_ref());
        merge_optional(&mut self.worker_id, patch.worker_id.as_ref());
        merge_optional(&mut self.workflow_id, patch.workflow_id.as_ref());
        merge_optional(&mut self.error, patch.error.as_ref());
        merge_optional(&mut self.result, patch.result.as_ref());
        merge_optional(&mut self.updated_at, patch.updated_at.as_ref());
        merge_optional(&mut self.completed_at, patch.completed_at.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_merges_only_set_fields() {
        let mut task = Task::new("T1", "Build");
        task.description = Some("compile everything".into());
        let patch = TaskPatch {
            status: Some(TaskStatus::Running),
            progress: Some(40.0),
            ..TaskPatch::default()
        };
        task.apply_patch(&patch);
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.progress, Some(40.0));
        assert_eq!(task.title, "Build");
        assert_eq!(task.description.as_deref(), Some("compile everything"));
    }

    #[test]
    fn patch_is_idempotent() {
        let mut once = Task::new("T1", "Build");
        let patch = TaskPatch {
            title: Some("Rebuild".into()),
            status: Some(TaskStatus::Queued),
            ..TaskPatch::default()
        };
        once.apply_patch(&patch);
        let mut twice = once.clone();
        twice.apply_patch(&patch);
        assert_eq!(once, twice);
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let json = r#"{"id":"T9","title":"Lint","workerId":"w1"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.worker_id.unwrap().as_str(), "w1");
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn empty_patch_deserializes() {
        let patch: TaskPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(patch, TaskPatch::default());
    }
}
