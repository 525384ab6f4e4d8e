//! # beacon-settings
//!
//! Configuration for the Beacon sync layer, loaded from three layers in
//! priority order:
//!
//! 1. **Compiled defaults**: [`BeaconSettings::default()`]
//! 2. **User file**: `~/.beacon/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `BEACON_*` overrides (highest priority)
//!
//! There is no global instance. Callers load settings once and hand the
//! relevant section to whatever needs it.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = BeaconSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = BeaconSettings::default();
        assert_eq!(settings.connection.url, "ws://localhost:8080/ws");
        assert!(settings.connection.auto_reconnect);
        assert_eq!(settings.connection.max_reconnect_attempts, 10);
        assert_eq!(settings.connection.reconnect_delay_ms, 1000);
        assert_eq!(settings.connection.max_reconnect_delay_ms, 30_000);
        assert!((settings.connection.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(settings.connection.heartbeat_interval_ms, 30_000);
        assert_eq!(settings.connection.connection_timeout_ms, 10_000);
        assert!(!settings.connection.debug);
        assert_eq!(settings.toasts.max_visible, 5);
        assert_eq!(settings.notifications.max_history, 100);
        assert_eq!(settings.logging.level, "info");
    }
}
