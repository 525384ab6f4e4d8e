use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind, merge_field, merge_optional};
use crate::ids::{NodeId, WorkflowId};

/// Workflow lifecycle status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Being edited, never started.
    #[default]
    Draft,
    /// Started, waiting for its first node.
    Pending,
    /// Executing nodes.
    Running,
    /// Suspended by a user.
    Paused,
    /// Blocked on a human review.
    WaitingReview,
    /// All nodes finished.
    Completed,
    /// A node failed.
    Failed,
    /// Stopped before completion.
    Cancelled,
}

/// Status of a single node in a workflow graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not reached yet.
    #[default]
    Pending,
    /// Executing.
    Running,
    /// Blocked on a human review.
    WaitingReview,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Bypassed by a branch.
    Skipped,
}

impl NodeStatus {
    /// Whether the node has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// A node as embedded in the full workflow document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    /// Node ID, unique within the workflow.
    pub id: NodeId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Status when the document was produced.
    #[serde(default)]
    pub status: NodeStatus,
}

/// A graph of nodes executed in order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Stable ID.
    pub id: WorkflowId,
    /// Display name.
    pub name: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Graph nodes.
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    /// Node currently executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<NodeId>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last server-side modification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// A draft workflow with no nodes.
    pub fn new(id: impl Into<WorkflowId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            status: WorkflowStatus::Draft,
            nodes: Vec::new(),
            current_node_id: None,
            error: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Fields changed by a `workflow_updated` event.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowPatch {
    /// A patch that only moves the status.
    pub fn status(status: WorkflowStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

impl Entity for Workflow {
    type Id = WorkflowId;
    type Patch = WorkflowPatch;

    const KIND: EntityKind = EntityKind::Workflow;

    fn id(&self) -> &WorkflowId {
        &self.id
    }

    fn apply_patch(&mut self, patch: &WorkflowPatch) {
        merge_field(&mut self.name, patch.name.as_ref());
        merge_optional(&mut self.description, patch.description.as_ref());
        merge_field(&mut self.status, patch.status.as_ref());
        merge_optional(&mut self.current_node_id, patch.current_node_id.as_ref());
        merge_optional(&mut self.error, patch.error.as_ref());
        merge_optional(&mut self.updated_at, patch.updated_at.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_leaves_nodes_alone() {
        let mut wf = Workflow::new("wf1", "release");
        wf.nodes.push(WorkflowNode {
            id: NodeId::from("n1"),
            name: "build".into(),
            status: NodeStatus::Running,
        });
        wf.apply_patch(&WorkflowPatch::status(WorkflowStatus::Paused));
        assert_eq!(wf.status, WorkflowStatus::Paused);
        assert_eq!(wf.nodes.len(), 1);
    }

    #[test]
    fn waiting_review_wire_name() {
        let json = serde_json::to_string(&NodeStatus::WaitingReview).unwrap();
        assert_eq!(json, "\"waiting_review\"");
    }

    #[test]
    fn terminal_node_statuses() {
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(!NodeStatus::WaitingReview.is_terminal());
    }
}
