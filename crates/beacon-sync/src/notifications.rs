//! Notification center.
//!
//! Holds the persistent notification list (newest first, capped at
//! `maxHistory`) and the action API a notification-center UI calls. Other
//! consumers raise notifications through [`NotificationCenter::add`]; the
//! server's own notification feed arrives through [`NotificationCenter::activate`].
//!
//! Toasts are optional. When a [`ToastQueue`] is attached, each newly added
//! notification at or above `minToastLevel` also spawns a toast.

use std::collections::VecDeque;
use std::sync::Arc;

use beacon_core::Channel;
use beacon_core::entities::{NewNotification, Notification};
use beacon_core::events::{NotificationCleared, NotificationCreated, NotificationRead};
use beacon_core::ids::NotificationId;
use beacon_realtime::RealtimeClient;
use beacon_settings::NotificationSettings;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::consumer::Activation;
use crate::errors::{Result, SyncError};
use crate::toast::ToastQueue;

struct Inner {
    settings: NotificationSettings,
    list: Mutex<VecDeque<Notification>>,
    toasts: Option<ToastQueue>,
}

impl Inner {
    /// Insert at the front, evicting the oldest past the cap. Returns
    /// `false` when the ID is already present.
    fn insert(&self, notification: Notification) -> bool {
        {
            let mut list = self.list.lock();
            if list.iter().any(|n| n.id == notification.id) {
                return false;
            }
            list.push_front(notification.clone());
            list.truncate(self.settings.max_history.max(1));
        }
        info!(
            id = %notification.id,
            level = ?notification.level,
            title = %notification.title,
            "notification"
        );
        self.maybe_toast(&notification);
        true
    }

    fn maybe_toast(&self, notification: &Notification) {
        let Some(toasts) = &self.toasts else {
            return;
        };
        if !self.settings.toasts_enabled || notification.level < self.settings.min_toast_level {
            return;
        }
        let _ = toasts.push_notification(notification);
    }

    fn set_read(&self, id: &NotificationId) -> bool {
        match self.list.lock().iter_mut().find(|n| n.id == *id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    fn clear_ids(&self, ids: &[NotificationId]) -> usize {
        let mut list = self.list.lock();
        let before = list.len();
        list.retain(|n| !ids.contains(&n.id));
        before - list.len()
    }

    fn clear(&self) -> usize {
        let mut list = self.list.lock();
        let removed = list.len();
        list.clear();
        removed
    }
}

/// Persistent notification list with read state. Clones share one list.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl NotificationCenter {
    /// Create a center without toasts.
    pub fn new(settings: NotificationSettings) -> Self {
        Self::build(settings, None)
    }

    /// Create a center that spawns toasts on `toasts`.
    pub fn with_toasts(settings: NotificationSettings, toasts: ToastQueue) -> Self {
        Self::build(settings, Some(toasts))
    }

    fn build(settings: NotificationSettings, toasts: Option<ToastQueue>) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                list: Mutex::new(VecDeque::new()),
                toasts,
            }),
        }
    }

    /// Follow the server's notification feed.
    pub fn activate(&self, client: &RealtimeClient) -> Activation {
        let created = Arc::clone(&self.inner);
        let read = Arc::clone(&self.inner);
        let cleared = Arc::clone(&self.inner);
        let handlers = vec![
            client.on::<NotificationCreated, _>(move |e| {
                if !created.insert(e.notification.clone()) {
                    debug!(id = %e.notification.id, "duplicate notification ignored");
                }
            }),
            client.on::<NotificationRead, _>(move |e| {
                if !read.set_read(&e.notification_id) {
                    debug!(id = %e.notification_id, "read event for unknown notification");
                }
            }),
            client.on::<NotificationCleared, _>(move |e| {
                let removed = match &e.ids {
                    Some(ids) => cleared.clear_ids(ids),
                    None => cleared.clear(),
                };
                debug!(removed, "notifications cleared remotely");
            }),
        ];
        Activation::new(handlers, client.lease([Channel::notifications()]))
    }

    /// Raise a notification on this client.
    pub fn add(&self, notification: NewNotification) -> Notification {
        let notification = notification.into_notification();
        let _ = self.inner.insert(notification.clone());
        notification
    }

    /// Insert a fully formed notification. Returns `false` if its ID is
    /// already present.
    pub fn insert(&self, notification: Notification) -> bool {
        self.inner.insert(notification)
    }

    /// Mark one notification read.
    pub fn mark_read(&self, id: &NotificationId) -> Result<()> {
        if self.inner.set_read(id) {
            Ok(())
        } else {
            Err(SyncError::UnknownNotification(id.clone()))
        }
    }

    /// Mark everything read. Returns how many changed.
    pub fn mark_all_read(&self) -> usize {
        let mut list = self.inner.list.lock();
        let mut changed = 0;
        for n in list.iter_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        changed
    }

    /// Remove one notification.
    pub fn remove(&self, id: &NotificationId) -> Result<Notification> {
        let mut list = self.inner.list.lock();
        let Some(index) = list.iter().position(|n| n.id == *id) else {
            return Err(SyncError::UnknownNotification(id.clone()));
        };
        list.remove(index)
            .ok_or_else(|| SyncError::UnknownNotification(id.clone()))
    }

    /// Remove everything. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.inner.clear()
    }

    /// Look up one notification.
    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        self.inner.list.lock().iter().find(|n| n.id == *id).cloned()
    }

    /// Every notification, newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.inner.list.lock().iter().cloned().collect()
    }

    /// Notifications not yet read.
    pub fn unread_count(&self) -> usize {
        self.inner.list.lock().iter().filter(|n| !n.read).count()
    }

    /// Number of notifications held.
    pub fn len(&self) -> usize {
        self.inner.list.lock().len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.list.lock().is_empty()
    }

    /// The attached toast queue, if any.
    pub fn toasts(&self) -> Option<&ToastQueue> {
        self.inner.toasts.as_ref()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(NotificationSettings::default())
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("len", &self.len())
            .field("unread", &self.unread_count())
            .field("toasts", &self.inner.toasts.is_some())
            .finish()
    }
}
