//! Entity records mirrored from the server.
//!
//! Every record kind is identified by a stable ID and can be updated in place
//! by a partial patch. Patches carry only the fields the server changed; a
//! `None` field leaves the local value untouched. Applying the same patch
//! twice yields the same record.

mod notification;
mod task;
mod worker;
mod workflow;

pub use notification::*;
pub use task::*;
pub use worker::*;
pub use workflow::*;

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// The four synchronized record kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A scheduled unit of work.
    Task,
    /// A process that executes tasks.
    Worker,
    /// A graph of nodes executed in order.
    Workflow,
    /// A user-facing notification.
    Notification,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Worker => write!(f, "worker"),
            Self::Workflow => write!(f, "workflow"),
            Self::Notification => write!(f, "notification"),
        }
    }
}

/// Pointer from a notification back to the record it is about.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Record kind.
    pub kind: EntityKind,
    /// Record ID.
    pub id: String,
}

impl EntityRef {
    /// Build a reference to a record.
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// A record kind that can live in a keyed store.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Stable identifier type.
    type Id: Clone + Eq + Hash + Ord + fmt::Display + Send + Sync + 'static;
    /// Partial update shape.
    type Patch: Clone + Send + Sync + 'static;

    /// Which kind this is.
    const KIND: EntityKind;

    /// The record's ID.
    fn id(&self) -> &Self::Id;

    /// Merge the set fields of `patch` into this record.
    fn apply_patch(&mut self, patch: &Self::Patch);
}

/// Overwrite `target` when `source` carries a value.
pub(crate) fn merge_field<T: Clone>(target: &mut T, source: Option<&T>) {
    if let Some(value) = source {
        target.clone_from(value);
    }
}

/// Overwrite an optional `target` when `source` carries a value.
pub(crate) fn merge_optional<T: Clone>(target: &mut Option<T>, source: Option<&T>) {
    if let Some(value) = source {
        *target = Some(value.clone());
    }
}
