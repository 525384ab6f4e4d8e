//! Ephemeral toast queue.
//!
//! Toasts are a presentation layer over notifications: short-lived, capped
//! at a visible count, and gone once they expire. Removal is two-phase so a
//! renderer can animate the exit: a dismissed or expired toast is first
//! marked [`ToastPhase::Exiting`], then deleted after the exit delay.
//!
//! Timers run on the ambient tokio runtime. Without one, toasts never
//! expire on their own but can still be dismissed and removed.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use beacon_core::entities::{Notification, NotificationLevel};
use beacon_settings::ToastSettings;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Identifies one toast within its queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToastId(u64);

impl fmt::Display for ToastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "toast-{}", self.0)
    }
}

/// Where a toast is in its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToastPhase {
    /// On screen.
    Visible,
    /// Dismissed, waiting out the exit delay.
    Exiting,
}

/// One toast.
#[derive(Clone, Debug, PartialEq)]
pub struct Toast {
    /// Queue-local ID.
    pub id: ToastId,
    /// Severity.
    pub level: NotificationLevel,
    /// Headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Sticky toasts only leave when dismissed or pushed out.
    pub sticky: bool,
    /// Lifetime phase.
    pub phase: ToastPhase,
}

struct Inner {
    max_visible: usize,
    duration: Duration,
    exit_delay: Duration,
    next_id: AtomicU64,
    toasts: Mutex<VecDeque<Toast>>,
}

/// Bounded, self-expiring toast list. Clones share one queue.
#[derive(Clone)]
pub struct ToastQueue {
    inner: Arc<Inner>,
}

impl ToastQueue {
    /// Create a queue from settings.
    pub fn new(settings: &ToastSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_visible: settings.max_visible.max(1),
                duration: Duration::from_millis(settings.duration_ms),
                exit_delay: Duration::from_millis(settings.exit_delay_ms),
                next_id: AtomicU64::new(0),
                toasts: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Show a toast that expires after the configured duration.
    pub fn push(
        &self,
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> ToastId {
        self.insert(level, title.into(), message.into(), false)
    }

    /// Show a toast that stays until dismissed.
    pub fn push_sticky(
        &self,
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> ToastId {
        self.insert(level, title.into(), message.into(), true)
    }

    /// Show a toast for a notification.
    pub fn push_notification(&self, notification: &Notification) -> ToastId {
        self.push(
            notification.level,
            notification.title.clone(),
            notification.message.clone(),
        )
    }

    /// Start the exit of a visible toast. Returns `false` when the toast is
    /// gone or already exiting.
    pub fn dismiss(&self, id: ToastId) -> bool {
        {
            let mut toasts = self.inner.toasts.lock();
            let Some(toast) = toasts.iter_mut().find(|t| t.id == id) else {
                return false;
            };
            if toast.phase == ToastPhase::Exiting {
                return false;
            }
            toast.phase = ToastPhase::Exiting;
        }

        if self.inner.exit_delay.is_zero() {
            let _ = self.remove(id);
        } else {
            self.schedule(self.inner.exit_delay, id, |queue, id| {
                let _ = queue.remove(id);
            });
        }
        true
    }

    /// Delete a toast right away, skipping the exit phase.
    pub fn remove(&self, id: ToastId) -> bool {
        let mut toasts = self.inner.toasts.lock();
        let before = toasts.len();
        toasts.retain(|t| t.id != id);
        toasts.len() != before
    }

    /// Delete every toast.
    pub fn clear(&self) {
        self.inner.toasts.lock().clear();
    }

    /// Snapshot of the toasts on screen, oldest first, exiting ones included.
    pub fn visible(&self) -> Vec<Toast> {
        self.inner.toasts.lock().iter().cloned().collect()
    }

    /// Number of toasts on screen.
    pub fn len(&self) -> usize {
        self.inner.toasts.lock().len()
    }

    /// Whether nothing is on screen.
    pub fn is_empty(&self) -> bool {
        self.inner.toasts.lock().is_empty()
    }

    fn insert(&self, level: NotificationLevel, title: String, message: String, sticky: bool) -> ToastId {
        let id = ToastId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        {
            let mut toasts = self.inner.toasts.lock();
            toasts.push_back(Toast {
                id,
                level,
                title,
                message,
                sticky,
                phase: ToastPhase::Visible,
            });
            while toasts.len() > self.inner.max_visible {
                if let Some(dropped) = toasts.pop_front() {
                    debug!(toast = %dropped.id, "toast pushed out");
                }
            }
        }

        if !sticky {
            self.schedule(self.inner.duration, id, |queue, id| {
                let _ = queue.dismiss(id);
            });
        }
        id
    }

    fn schedule(&self, after: Duration, id: ToastId, action: fn(&ToastQueue, ToastId)) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(toast = %id, "no async runtime, toast timer skipped");
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        drop(runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                action(&ToastQueue { inner }, id);
            }
        }));
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(&ToastSettings::default())
    }
}

impl fmt::Debug for ToastQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToastQueue")
            .field("max_visible", &self.inner.max_visible)
            .field("visible", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn queue(max_visible: usize) -> ToastQueue {
        ToastQueue::new(&ToastSettings {
            max_visible,
            duration_ms: 5000,
            exit_delay_ms: 300,
        })
    }

    fn titles(queue: &ToastQueue) -> Vec<String> {
        queue.visible().into_iter().map(|t| t.title).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn cap_drops_oldest_first() {
        let q = queue(2);
        let _ = q.push(NotificationLevel::Info, "a", "");
        let _ = q.push(NotificationLevel::Info, "b", "");
        let _ = q.push(NotificationLevel::Info, "c", "");
        assert_eq!(titles(&q), vec!["b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn expires_through_exit_phase() {
        let q = queue(5);
        let id = q.push(NotificationLevel::Success, "done", "");

        sleep(Duration::from_millis(4999)).await;
        assert_eq!(q.visible()[0].phase, ToastPhase::Visible);

        sleep(Duration::from_millis(2)).await;
        assert_eq!(q.visible()[0].phase, ToastPhase::Exiting);
        assert_eq!(q.visible()[0].id, id);

        sleep(Duration::from_millis(300)).await;
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn early_dismiss_is_two_phase() {
        let q = queue(5);
        let id = q.push(NotificationLevel::Info, "hi", "");
        sleep(Duration::from_millis(100)).await;

        assert!(q.dismiss(id));
        assert!(!q.dismiss(id));
        assert_eq!(q.len(), 1);
        sleep(Duration::from_millis(301)).await;
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sticky_toasts_do_not_expire() {
        let q = queue(5);
        let id = q.push_sticky(NotificationLevel::Error, "broken", "");
        sleep(Duration::from_secs(60)).await;
        assert_eq!(q.visible()[0].phase, ToastPhase::Visible);
        assert!(q.dismiss(id));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_for_pushed_out_toast_is_harmless() {
        let q = queue(1);
        let first = q.push(NotificationLevel::Info, "a", "");
        let _ = q.push_sticky(NotificationLevel::Info, "b", "");
        sleep(Duration::from_secs(6)).await;
        assert_eq!(titles(&q), vec!["b"]);
        assert!(!q.dismiss(first));
    }

    #[test]
    fn works_without_runtime() {
        let q = queue(5);
        let id = q.push(NotificationLevel::Warning, "w", "m");
        assert_eq!(q.len(), 1);
        assert!(q.remove(id));
        assert!(!q.remove(id));
    }

    #[test]
    fn zero_exit_delay_removes_at_once() {
        let q = ToastQueue::new(&ToastSettings {
            max_visible: 3,
            duration_ms: 1000,
            exit_delay_ms: 0,
        });
        let id = q.push_sticky(NotificationLevel::Info, "x", "");
        assert!(q.dismiss(id));
        assert!(q.is_empty());
    }
}
