//! Runtime connection configuration.

use std::fmt;
use std::time::Duration;

use beacon_core::backoff::BackoffPolicy;
use beacon_settings::ConnectionSettings;

/// Everything a connection needs to open and heal itself.
#[derive(Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Server endpoint.
    pub url: String,
    /// Bearer token sent when opening the transport.
    pub token: Option<String>,
    /// Reconnect after abnormal closes.
    pub auto_reconnect: bool,
    /// Reconnect schedule and attempt budget.
    pub backoff: BackoffPolicy,
    /// Liveness probe interval. No reply within twice this is a dead link.
    pub heartbeat_interval: Duration,
    /// Bound on a single open attempt.
    pub connection_timeout: Duration,
    /// Verbose connection logging.
    pub debug: bool,
}

impl ConnectionConfig {
    /// Defaults for everything but the endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_settings(&ConnectionSettings {
            url: url.into(),
            ..ConnectionSettings::default()
        })
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            url: settings.url.clone(),
            token: settings.token.clone(),
            auto_reconnect: settings.auto_reconnect,
            backoff: BackoffPolicy {
                base: Duration::from_millis(settings.reconnect_delay_ms),
                multiplier: settings.backoff_multiplier,
                max: Duration::from_millis(settings.max_reconnect_delay_ms),
                max_attempts: settings.max_reconnect_attempts,
            },
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            connection_timeout: Duration::from_millis(settings.connection_timeout_ms),
            debug: settings.debug,
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Enable or disable automatic reconnect.
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Replace the reconnect schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the reconnect attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.backoff.max_attempts = max_attempts;
        self
    }

    /// Set the liveness probe interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the open timeout.
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Enable verbose connection logging.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Time without a liveness reply after which the link is considered dead.
    pub fn liveness_deadline(&self) -> Duration {
        self.heartbeat_interval * 2
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("auto_reconnect", &self.auto_reconnect)
            .field("backoff", &self.backoff)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("connection_timeout", &self.connection_timeout)
            .field("debug", &self.debug)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_documented_defaults() {
        let config = ConnectionConfig::new("ws://hub/ws");
        assert_eq!(config.url, "ws://hub/ws");
        assert!(config.token.is_none());
        assert!(config.auto_reconnect);
        assert_eq!(config.backoff, BackoffPolicy::default());
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.liveness_deadline(), Duration::from_secs(60));
    }

    #[test]
    fn from_settings_converts_units() {
        let settings = ConnectionSettings {
            reconnect_delay_ms: 250,
            max_reconnect_delay_ms: 4000,
            max_reconnect_attempts: 3,
            heartbeat_interval_ms: 1500,
            ..ConnectionSettings::default()
        };
        let config = ConnectionConfig::from_settings(&settings);
        assert_eq!(config.backoff.base, Duration::from_millis(250));
        assert_eq!(config.backoff.max, Duration::from_millis(4000));
        assert_eq!(config.backoff.max_attempts, 3);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1500));
    }

    #[test]
    fn builders_chain() {
        let config = ConnectionConfig::new("ws://hub/ws")
            .with_token("t")
            .with_auto_reconnect(false)
            .with_max_attempts(5)
            .with_debug(true);
        assert_eq!(config.token.as_deref(), Some("t"));
        assert!(!config.auto_reconnect);
        assert_eq!(config.backoff.max_attempts, 5);
        assert!(config.debug);
    }

    #[test]
    fn debug_hides_token() {
        let config = ConnectionConfig::new("ws://hub/ws").with_token("s3cr3t");
        assert!(!format!("{config:?}").contains("s3cr3t"));
    }
}
