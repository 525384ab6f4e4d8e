//! Server-pushed events.
//!
//! [`ServerEvent`] is the closed set of events the server can push. On the
//! wire each event is `{"type": "<wire name>", "data": {...}}`; in memory it
//! is one enum variant wrapping a payload struct of the same name.
//!
//! [`EventKind`] is the fieldless tag of a `ServerEvent`. The dispatcher
//! indexes handlers by it, and [`EventPayload`] lets a handler be typed to a
//! single payload shape instead of matching on the whole enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{
    NodeStatus, Notification, Task, TaskPatch, TaskStatus, Worker, WorkerMetrics, WorkerPatch,
    WorkerStatus, Workflow, WorkflowPatch, WorkflowStatus,
};
use crate::ids::{NodeId, NotificationId, ReviewId, TaskId, WorkerId, WorkflowId};

/// A payload type carried by exactly one [`ServerEvent`] variant.
pub trait EventPayload: Send + Sync + 'static {
    /// The tag of the variant carrying this payload.
    const KIND: EventKind;

    /// Borrow the payload out of an event of the matching kind.
    fn from_event(event: &ServerEvent) -> Option<&Self>;
}

macro_rules! server_events {
    ($($(#[$meta:meta])* $variant:ident => $wire:literal),* $(,)?) => {
        /// Every event the server pushes.
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "type", content = "data")]
        pub enum ServerEvent {
            $(
                $(#[$meta])*
                #[serde(rename = $wire)]
                $variant($variant),
            )*
        }

        /// Tag of a [`ServerEvent`] variant.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $(
                $(#[$meta])*
                $variant,
            )*
        }

        impl EventKind {
            /// Every kind, in declaration order.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant),*];

            /// The wire name carried in the `type` field.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)*
                }
            }

            /// Look a kind up by wire name.
            pub fn from_wire(name: &str) -> Option<Self> {
                match name {
                    $($wire => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }

        impl ServerEvent {
            /// This event's tag.
            pub fn kind(&self) -> EventKind {
                match self {
                    $(Self::$variant(_) => EventKind::$variant,)*
                }
            }
        }

        $(
            impl EventPayload for $variant {
                const KIND: EventKind = EventKind::$variant;

                #[allow(unreachable_patterns)]
                fn from_event(event: &ServerEvent) -> Option<&Self> {
                    match event {
                        ServerEvent::$variant(payload) => Some(payload),
                        _ => None,
                    }
                }
            }

            impl From<$variant> for ServerEvent {
                fn from(payload: $variant) -> Self {
                    Self::$variant(payload)
                }
            }
        )*
    };
}

server_events! {
    /// Server greeting sent right after the transport opens.
    ConnectionEstablished => "connection_established",

    /// A task was created.
    TaskCreated => "task_created",
    /// Some task fields changed.
    TaskUpdated => "task_updated",
    /// A task was deleted.
    TaskDeleted => "task_deleted",
    /// A task moved to a new status.
    TaskStatusChanged => "task_status_changed",
    /// A running task reported progress.
    TaskProgress => "task_progress",
    /// A task finished successfully.
    TaskCompleted => "task_completed",
    /// A task finished with an error.
    TaskFailed => "task_failed",

    /// A worker registered with the scheduler.
    WorkerRegistered => "worker_registered",
    /// Some worker fields changed.
    WorkerUpdated => "worker_updated",
    /// A worker was removed.
    WorkerDeleted => "worker_deleted",
    /// A worker changed availability.
    WorkerStatusChanged => "worker_status_changed",
    /// A worker reported resource metrics.
    WorkerMetricsReported => "worker_metrics",
    /// A worker proved it is alive.
    WorkerHeartbeat => "worker_heartbeat",

    /// A workflow was created.
    WorkflowCreated => "workflow_created",
    /// Some workflow fields changed.
    WorkflowUpdated => "workflow_updated",
    /// A workflow was deleted.
    WorkflowDeleted => "workflow_deleted",
    /// A workflow moved to a new status.
    WorkflowStatusChanged => "workflow_status_changed",
    /// One node in a workflow changed status.
    WorkflowNodeUpdated => "workflow_node_updated",
    /// A node is waiting for a human decision.
    WorkflowReviewRequested => "workflow_review_requested",
    /// A workflow finished successfully.
    WorkflowCompleted => "workflow_completed",
    /// A workflow finished with an error.
    WorkflowFailed => "workflow_failed",

    /// A notification was created for this user.
    NotificationCreated => "notification_created",
    /// A notification was read on another client.
    NotificationRead => "notification_read",
    /// Notifications were cleared on another client.
    NotificationCleared => "notification_cleared",
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────────────────────────

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEstablished {
    pub client_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreated {
    pub task: Task,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdated {
    pub task_id: TaskId,
    pub changes: TaskPatch,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDeleted {
    pub task_id: TaskId,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusChanged {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<TaskStatus>,
    pub new_status: TaskStatus,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub task_id: TaskId,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompleted {
    pub task_id: TaskId,
    /// Wall-clock duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailed {
    pub task_id: TaskId,
    pub error: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Workers
// ─────────────────────────────────────────────────────────────────────────────

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRegistered {
    pub worker: Worker,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerUpdated {
    pub worker_id: WorkerId,
    pub changes: WorkerPatch,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDeleted {
    pub worker_id: WorkerId,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatusChanged {
    pub worker_id: WorkerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<WorkerStatus>,
    pub new_status: WorkerStatus,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMetricsReported {
    pub worker_id: WorkerId,
    pub metrics: WorkerMetrics,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerHeartbeat {
    pub worker_id: WorkerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflows
// ─────────────────────────────────────────────────────────────────────────────

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCreated {
    pub workflow: Workflow,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowUpdated {
    pub workflow_id: WorkflowId,
    pub changes: WorkflowPatch,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDeleted {
    pub workflow_id: WorkflowId,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatusChanged {
    pub workflow_id: WorkflowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<WorkflowStatus>,
    pub new_status: WorkflowStatus,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNodeUpdated {
    pub workflow_id: WorkflowId,
    pub node_id: NodeId,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReviewRequested {
    pub workflow_id: WorkflowId,
    pub node_id: NodeId,
    pub review_id: ReviewId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCompleted {
    pub workflow_id: WorkflowId,
    /// Wall-clock duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowFailed {
    pub workflow_id: WorkflowId,
    pub error: String,
    /// Node that caused the failure, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCreated {
    pub notification: Notification,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRead {
    pub notification_id: NotificationId,
}

/// Clears the listed notifications, or all of them when `ids` is absent.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationCleared {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<NotificationId>>,
}
