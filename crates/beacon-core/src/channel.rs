//! Channel names.
//!
//! A channel is an opaque topic string. The server routes pushed events to
//! every connection subscribed to the matching channel.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{TaskId, WorkerId, WorkflowId};

/// A named topic (`"tasks"`, `"task:<id>"`, `"workers"`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    /// Wrap an arbitrary topic string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Collective task channel.
    pub fn tasks() -> Self {
        Self::new("tasks")
    }

    /// Events for a single task.
    pub fn task(id: &TaskId) -> Self {
        Self(format!("task:{id}"))
    }

    /// Collective worker channel.
    pub fn workers() -> Self {
        Self::new("workers")
    }

    /// Events for a single worker.
    pub fn worker(id: &WorkerId) -> Self {
        Self(format!("worker:{id}"))
    }

    /// Collective workflow channel.
    pub fn workflows() -> Self {
        Self::new("workflows")
    }

    /// Events for a single workflow.
    pub fn workflow(id: &WorkflowId) -> Self {
        Self(format!("workflow:{id}"))
    }

    /// The user's notification feed.
    pub fn notifications() -> Self {
        Self::new("notifications")
    }

    /// The topic string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Channel {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Channel {
    fn from(s: String) -> Self {
        Self(s)
    }
}
