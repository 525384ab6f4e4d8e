//! Toast and notification center settings.

use beacon_core::entities::NotificationLevel;
use serde::{Deserialize, Serialize};

/// Transient toast queue settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToastSettings {
    /// Toasts shown at once; the oldest is dropped past this.
    pub max_visible: usize,
    /// Lifetime of a non-sticky toast.
    pub duration_ms: u64,
    /// Time a dismissed toast spends exiting before removal.
    pub exit_delay_ms: u64,
}

impl Default for ToastSettings {
    fn default() -> Self {
        Self {
            max_visible: 5,
            duration_ms: 5000,
            exit_delay_ms: 300,
        }
    }
}

/// Persistent notification list settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    /// Notifications kept before the oldest are evicted.
    pub max_history: usize,
    /// Raise a toast for new notifications.
    pub toasts_enabled: bool,
    /// Lowest level that raises a toast.
    pub min_toast_level: NotificationLevel,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            max_history: 100,
            toasts_enabled: true,
            min_toast_level: NotificationLevel::Info,
        }
    }
}
