//! Workflow consumer.
//!
//! Keeps the workflow store plus two derived views:
//!
//! - a per-node status map (`workflow -> node -> status`), built only from
//!   node, review, completion, and failure events, never from the full
//!   document a `workflow_created` carries
//! - a pending-human-review queue, appended on `workflow_review_requested`
//!   and drained explicitly by [`WorkflowSync::resolve_review`] or when the
//!   workflow finishes
//!
//! [`WorkflowSync::submit_review`] answers a review over the ack gateway and
//! resolves it locally once the server accepts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use beacon_core::Channel;
use beacon_core::entities::{
    EntityKind, EntityRef, NewNotification, NodeStatus, NotificationLevel, Workflow,
    WorkflowPatch, WorkflowStatus,
};
use beacon_core::events::{
    WorkflowCompleted, WorkflowCreated, WorkflowDeleted, WorkflowFailed, WorkflowNodeUpdated,
    WorkflowReviewRequested, WorkflowStatusChanged, WorkflowUpdated,
};
use beacon_core::ids::{NodeId, ReviewId, WorkflowId};
use beacon_realtime::RealtimeClient;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::consumer::{Activation, Callback, Scope, fire, scoped};
use crate::errors::{Result, SyncError};
use crate::notifications::NotificationCenter;
use crate::store::EntityStore;

/// Event name for answering a review.
pub const SUBMIT_REVIEW_EVENT: &str = "workflow.review.submit";

type NodeMap = HashMap<WorkflowId, BTreeMap<NodeId, NodeStatus>>;

/// A node waiting for a human decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingReview {
    /// Review ID assigned by the server.
    pub review_id: ReviewId,
    /// Workflow the node belongs to.
    pub workflow_id: WorkflowId,
    /// Node waiting on the review.
    pub node_id: NodeId,
    /// Prompt shown to the reviewer.
    pub message: Option<String>,
}

/// A reviewer's answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewDecision {
    /// Let the node continue.
    pub approved: bool,
    /// Free-form note for the workflow log.
    pub comment: Option<String>,
}

impl ReviewDecision {
    /// Approve without a comment.
    pub fn approve() -> Self {
        Self {
            approved: true,
            comment: None,
        }
    }

    /// Reject with a reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            comment: Some(reason.into()),
        }
    }
}

/// What one workflow activation follows and which hooks it runs.
#[derive(Clone, Default)]
pub struct WorkflowWatch {
    scope: Scope<WorkflowId>,
    quiet: bool,
    on_node_updated: Option<Callback<WorkflowNodeUpdated>>,
    on_review_requested: Option<Callback<WorkflowReviewRequested>>,
    on_completed: Option<Callback<WorkflowCompleted>>,
    on_failed: Option<Callback<WorkflowFailed>>,
}

impl WorkflowWatch {
    /// Every workflow, over the `workflows` channel.
    pub fn all() -> Self {
        Self::default()
    }

    /// One workflow, over `workflow:<id>`.
    pub fn workflow(id: impl Into<WorkflowId>) -> Self {
        Self {
            scope: Scope::One(id.into()),
            ..Self::default()
        }
    }

    /// Do not raise notifications for this activation.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Run `f` on every node update in scope.
    #[must_use]
    pub fn on_node_updated(
        mut self,
        f: impl Fn(&WorkflowNodeUpdated) + Send + Sync + 'static,
    ) -> Self {
        self.on_node_updated = Some(Arc::new(f));
        self
    }

    /// Run `f` on every review request in scope.
    #[must_use]
    pub fn on_review_requested(
        mut self,
        f: impl Fn(&WorkflowReviewRequested) + Send + Sync + 'static,
    ) -> Self {
        self.on_review_requested = Some(Arc::new(f));
        self
    }

    /// Run `f` when a workflow in scope completes.
    #[must_use]
    pub fn on_completed(mut self, f: impl Fn(&WorkflowCompleted) + Send + Sync + 'static) -> Self {
        self.on_completed = Some(Arc::new(f));
        self
    }

    /// Run `f` when a workflow in scope fails.
    #[must_use]
    pub fn on_failed(mut self, f: impl Fn(&WorkflowFailed) + Send + Sync + 'static) -> Self {
        self.on_failed = Some(Arc::new(f));
        self
    }

    fn channel(&self) -> Channel {
        match &self.scope {
            Scope::All => Channel::workflows(),
            Scope::One(id) => Channel::workflow(id),
        }
    }
}

struct Inner {
    store: Arc<dyn EntityStore<Workflow>>,
    nodes: Mutex<NodeMap>,
    reviews: Mutex<Vec<PendingReview>>,
    notifications: Option<NotificationCenter>,
}

impl Inner {
    fn created(&self, e: &WorkflowCreated) {
        self.store.set(e.workflow.clone());
        self.store.invalidate_listings();
    }

    fn updated(&self, e: &WorkflowUpdated) {
        let _ = self.store.merge(&e.workflow_id, &e.changes);
    }

    fn deleted(&self, e: &WorkflowDeleted) {
        let _ = self.store.remove(&e.workflow_id);
        let _ = self.nodes.lock().remove(&e.workflow_id);
        self.drop_reviews(&e.workflow_id);
    }

    fn status_changed(&self, e: &WorkflowStatusChanged) {
        let _ = self
            .store
            .merge(&e.workflow_id, &WorkflowPatch::status(e.new_status));
    }

    fn node_updated(&self, e: &WorkflowNodeUpdated) {
        self.set_node(&e.workflow_id, &e.node_id, e.status);
        if e.status == NodeStatus::Running {
            let patch = WorkflowPatch {
                current_node_id: Some(e.node_id.clone()),
                ..WorkflowPatch::default()
            };
            let _ = self.store.merge(&e.workflow_id, &patch);
        }
    }

    fn review_requested(&self, e: &WorkflowReviewRequested, notify: bool) {
        self.set_node(&e.workflow_id, &e.node_id, NodeStatus::WaitingReview);
        let _ = self
            .store
            .merge(&e.workflow_id, &WorkflowPatch::status(WorkflowStatus::WaitingReview));

        let queued = {
            let mut reviews = self.reviews.lock();
            if reviews.iter().any(|r| r.review_id == e.review_id) {
                false
            } else {
                reviews.push(PendingReview {
                    review_id: e.review_id.clone(),
                    workflow_id: e.workflow_id.clone(),
                    node_id: e.node_id.clone(),
                    message: e.message.clone(),
                });
                true
            }
        };
        if queued && notify {
            let message = e
                .message
                .clone()
                .unwrap_or_else(|| format!("Node {} is waiting for review", e.node_id));
            self.raise(NotificationLevel::Warning, "Review Requested", message, &e.workflow_id);
        }
    }

    fn completed(&self, e: &WorkflowCompleted, notify: bool) {
        let _ = self
            .store
            .merge(&e.workflow_id, &WorkflowPatch::status(WorkflowStatus::Completed));
        if let Some(nodes) = self.nodes.lock().get_mut(&e.workflow_id) {
            for status in nodes.values_mut() {
                if matches!(status, NodeStatus::Running | NodeStatus::WaitingReview) {
                    *status = NodeStatus::Completed;
                }
            }
        }
        self.drop_reviews(&e.workflow_id);
        debug!(workflow = %e.workflow_id, duration_ms = e.duration, "workflow completed");

        if notify {
            let message = format!("{} finished", self.name(&e.workflow_id));
            self.raise(NotificationLevel::Success, "Workflow Completed", message, &e.workflow_id);
        }
    }

    fn failed(&self, e: &WorkflowFailed, notify: bool) {
        let patch = WorkflowPatch {
            status: Some(WorkflowStatus::Failed),
            error: Some(e.error.clone()),
            ..WorkflowPatch::default()
        };
        let _ = self.store.merge(&e.workflow_id, &patch);
        if let Some(node_id) = &e.node_id {
            self.set_node(&e.workflow_id, node_id, NodeStatus::Failed);
        }
        self.drop_reviews(&e.workflow_id);
        debug!(workflow = %e.workflow_id, error = %e.error, "workflow failed");

        if notify {
            self.raise(NotificationLevel::Error, "Workflow Failed", e.error.clone(), &e.workflow_id);
        }
    }

    fn set_node(&self, workflow_id: &WorkflowId, node_id: &NodeId, status: NodeStatus) {
        let _ = self
            .nodes
            .lock()
            .entry(workflow_id.clone())
            .or_default()
            .insert(node_id.clone(), status);
    }

    fn drop_reviews(&self, workflow_id: &WorkflowId) {
        self.reviews.lock().retain(|r| r.workflow_id != *workflow_id);
    }

    fn name(&self, id: &WorkflowId) -> String {
        self.store
            .get(id)
            .map_or_else(|| format!("Workflow {id}"), |w| w.name)
    }

    fn raise(&self, level: NotificationLevel, title: &str, message: String, id: &WorkflowId) {
        if let Some(center) = &self.notifications {
            let _ = center.add(
                NewNotification::new(level, title)
                    .message(message)
                    .about(EntityRef::new(EntityKind::Workflow, id.as_str())),
            );
        }
    }
}

/// Keeps a workflow store, node status map, and review queue in step with
/// workflow events.
#[derive(Clone)]
pub struct WorkflowSync {
    inner: Arc<Inner>,
}

impl WorkflowSync {
    /// Write into `store` without raising notifications.
    pub fn new(store: Arc<dyn EntityStore<Workflow>>) -> Self {
        Self::build(store, None)
    }

    /// Write into `store` and raise review/completion/failure notifications.
    pub fn with_notifications(
        store: Arc<dyn EntityStore<Workflow>>,
        notifications: NotificationCenter,
    ) -> Self {
        Self::build(store, Some(notifications))
    }

    fn build(
        store: Arc<dyn EntityStore<Workflow>>,
        notifications: Option<NotificationCenter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                nodes: Mutex::new(HashMap::new()),
                reviews: Mutex::new(Vec::new()),
                notifications,
            }),
        }
    }

    /// Subscribe and start applying events.
    pub fn activate(&self, client: &RealtimeClient, watch: WorkflowWatch) -> Activation {
        let notify = !watch.quiet;
        let scope = &watch.scope;
        let mut handlers = Vec::with_capacity(8);

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkflowCreated| e.workflow.id.clone(),
            move |e| inner.created(e),
        ));

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkflowUpdated| e.workflow_id.clone(),
            move |e| inner.updated(e),
        ));

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkflowDeleted| e.workflow_id.clone(),
            move |e| inner.deleted(e),
        ));

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkflowStatusChanged| e.workflow_id.clone(),
            move |e| inner.status_changed(e),
        ));

        let inner = Arc::clone(&self.inner);
        let hook = watch.on_node_updated.clone();
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkflowNodeUpdated| e.workflow_id.clone(),
            move |e| {
                inner.node_updated(e);
                fire(hook.as_ref(), e);
            },
        ));

        let inner = Arc::clone(&self.inner);
        let hook = watch.on_review_requested.clone();
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkflowReviewRequested| e.workflow_id.clone(),
            move |e| {
                inner.review_requested(e, notify);
                fire(hook.as_ref(), e);
            },
        ));

        let inner = Arc::clone(&self.inner);
        let hook = watch.on_completed.clone();
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkflowCompleted| e.workflow_id.clone(),
            move |e| {
                inner.completed(e, notify);
                fire(hook.as_ref(), e);
            },
        ));

        let inner = Arc::clone(&self.inner);
        let hook = watch.on_failed.clone();
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkflowFailed| e.workflow_id.clone(),
            move |e| {
                inner.failed(e, notify);
                fire(hook.as_ref(), e);
            },
        ));

        Activation::new(handlers, client.lease([watch.channel()]))
    }

    /// The store this consumer writes to.
    pub fn store(&self) -> &Arc<dyn EntityStore<Workflow>> {
        &self.inner.store
    }

    /// Status of one node, if any event has mentioned it.
    pub fn node_status(&self, workflow_id: &WorkflowId, node_id: &NodeId) -> Option<NodeStatus> {
        self.inner
            .nodes
            .lock()
            .get(workflow_id)
            .and_then(|nodes| nodes.get(node_id).copied())
    }

    /// Every known node status of one workflow, ordered by node ID.
    pub fn node_statuses(&self, workflow_id: &WorkflowId) -> BTreeMap<NodeId, NodeStatus> {
        self.inner
            .nodes
            .lock()
            .get(workflow_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Reviews waiting for a decision, oldest first.
    pub fn pending_reviews(&self) -> Vec<PendingReview> {
        self.inner.reviews.lock().clone()
    }

    /// Take a review off the queue once it has been handled.
    pub fn resolve_review(&self, review_id: &ReviewId) -> Option<PendingReview> {
        let mut reviews = self.inner.reviews.lock();
        let index = reviews.iter().position(|r| r.review_id == *review_id)?;
        Some(reviews.remove(index))
    }

    /// Send a decision for a pending review and wait for the server to
    /// accept it. The review leaves the queue only on success.
    #[instrument(skip(self, client, decision), fields(approved = decision.approved))]
    pub async fn submit_review(
        &self,
        client: &RealtimeClient,
        review_id: &ReviewId,
        decision: ReviewDecision,
    ) -> Result<Value> {
        let review = self
            .inner
            .reviews
            .lock()
            .iter()
            .find(|r| r.review_id == *review_id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownReview(review_id.clone()))?;

        let reply = client
            .acks()
            .request(
                SUBMIT_REVIEW_EVENT,
                json!({
                    "workflowId": review.workflow_id,
                    "nodeId": review.node_id,
                    "reviewId": review.review_id,
                    "approved": decision.approved,
                    "comment": decision.comment,
                }),
            )
            .await?;

        let _ = self.resolve_review(review_id);
        info!(review = %review_id, "review submitted");
        Ok(reply)
    }
}

impl std::fmt::Debug for WorkflowSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowSync")
            .field("tracked", &self.inner.nodes.lock().len())
            .field("pending_reviews", &self.inner.reviews.lock().len())
            .finish()
    }
}
