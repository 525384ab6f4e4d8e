use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind, merge_field, merge_optional};
use crate::ids::{TaskId, WorkerId};

/// Worker availability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Connected and accepting work.
    Online,
    /// Connected with nothing assigned.
    Idle,
    /// Connected and executing a task.
    Busy,
    /// Not reachable.
    #[default]
    Offline,
    /// Reachable but reporting a fault.
    Error,
}

impl WorkerStatus {
    /// Whether the worker can be reached at all.
    pub fn is_online(self) -> bool {
        !matches!(self, Self::Offline)
    }
}

/// Resource metrics a worker reports periodically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerMetrics {
    /// CPU utilisation (0–100).
    pub cpu_percent: f64,
    /// Memory utilisation (0–100).
    pub memory_percent: f64,
    /// Tasks currently executing.
    pub active_tasks: u32,
    /// Tasks completed since registration.
    pub completed_tasks: u64,
    /// Tasks failed since registration.
    pub failed_tasks: u64,
}

/// A process that executes tasks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    /// Stable ID.
    pub id: WorkerId,
    /// Display name.
    pub name: String,
    /// Availability.
    #[serde(default)]
    pub status: WorkerStatus,
    /// Tool adapters or task types the worker accepts.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Task the worker is currently executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<TaskId>,
    /// Latest metrics snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<WorkerMetrics>,
    /// Last heartbeat the server saw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Registration time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
}

impl Worker {
    /// An offline worker with only the required fields.
    pub fn new(id: impl Into<WorkerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: WorkerStatus::Offline,
            capabilities: Vec::new(),
            current_task_id: None,
            metrics: None,
            last_heartbeat: None,
            registered_at: None,
        }
    }
}

/// Fields changed by a `worker_updated` event.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<WorkerMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl Entity for Worker {
    type Id = WorkerId;
    type Patch = WorkerPatch;

    const KIND: EntityKind = EntityKind::Worker;

    fn id(&self) -> &WorkerId {
        &self.id
    }

    fn apply_patch(&mut self, patch: &WorkerPatch) {
        merge_field(&mut self.name, patch.name.as_ref());
        merge_field(&mut self.status, patch.status.as_ref());
        merge_field(&mut self.capabilities, patch.capabilities.as_ref());
        merge_optional(&mut self.current_task_id, patch.current_task_id.as_ref());
        merge_optional(&mut self.metrics, patch.metrics.as_ref());
        merge_optional(&mut self.last_heartbeat, patch.last_heartbeat.as_ref());
    }
}
