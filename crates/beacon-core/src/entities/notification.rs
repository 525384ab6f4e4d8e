use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind, EntityRef, merge_field};
use crate::ids::NotificationId;

/// Severity of a notification. Ordered from least to most severe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Neutral information.
    #[default]
    Info,
    /// Something finished well.
    Success,
    /// Needs attention soon.
    Warning,
    /// Something broke.
    Error,
}

/// A user-facing notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Stable ID.
    pub id: NotificationId,
    /// Severity.
    #[serde(default)]
    pub level: NotificationLevel,
    /// Short headline.
    pub title: String,
    /// Body text.
    #[serde(default)]
    pub message: String,
    /// Whether the user has seen it.
    #[serde(default)]
    pub read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Record the notification is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,
}

/// Input for raising a notification on the client.
#[derive(Clone, Debug, PartialEq)]
pub struct NewNotification {
    /// Severity.
    pub level: NotificationLevel,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Record the notification is about.
    pub entity: Option<EntityRef>,
}

impl NewNotification {
    /// Start a notification with a level and title.
    pub fn new(level: NotificationLevel, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: String::new(),
            entity: None,
        }
    }

    /// Set the body text.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Point the notification at a record.
    #[must_use]
    pub fn about(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Materialize with a fresh ID and the current time.
    pub fn into_notification(self) -> Notification {
        Notification {
            id: NotificationId::generate(),
            level: self.level,
            title: self.title,
            message: self.message,
            read: false,
            created_at: Utc::now(),
            entity: self.entity,
        }
    }
}

/// Fields a notification can change after creation.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
}

impl Entity for Notification {
    type Id = NotificationId;
    type Patch = NotificationPatch;

    const KIND: EntityKind = EntityKind::Notification;

    fn id(&self) -> &NotificationId {
        &self.id
    }

    fn apply_patch(&mut self, patch: &NotificationPatch) {
        merge_field(&mut self.read, patch.read.as_ref());
    }
}
