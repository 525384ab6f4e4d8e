//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file may name only the fields it changes.

mod connection;
mod ui;

pub use connection::*;
pub use ui::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// # JSON Format
///
/// ```json
/// {
///   "connection": { "url": "wss://hub.example.com/ws", "heartbeatIntervalMs": 15000 },
///   "toasts": { "maxVisible": 3 },
///   "notifications": { "minToastLevel": "warning" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeaconSettings {
    /// Realtime connection settings.
    pub connection: ConnectionSettings,
    /// Toast queue settings.
    pub toasts: ToastSettings,
    /// Notification center settings.
    pub notifications: NotificationSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl BeaconSettings {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        if c.url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("connection.url is empty".into()));
        }
        if c.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.heartbeatIntervalMs must be > 0".into(),
            ));
        }
        if c.connection_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.connectionTimeoutMs must be > 0".into(),
            ));
        }
        if !c.backoff_multiplier.is_finite() || c.backoff_multiplier < 1.0 {
            return Err(SettingsError::InvalidValue(format!(
                "connection.backoffMultiplier must be >= 1.0, got {}",
                c.backoff_multiplier
            )));
        }
        if c.max_reconnect_delay_ms < c.reconnect_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "connection.maxReconnectDelayMs ({}) is below reconnectDelayMs ({})",
                c.max_reconnect_delay_ms, c.reconnect_delay_ms
            )));
        }
        if self.toasts.max_visible == 0 {
            return Err(SettingsError::InvalidValue(
                "toasts.maxVisible must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Base filter level (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
