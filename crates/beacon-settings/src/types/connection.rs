//! Realtime connection settings.

use std::fmt;

use beacon_core::backoff::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS, DEFAULT_MULTIPLIER,
};
use serde::{Deserialize, Serialize};

/// Default server endpoint.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";

/// Connection, reconnect, and liveness settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// WebSocket endpoint.
    pub url: String,
    /// Bearer token sent on the upgrade request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Reconnect after abnormal closes.
    pub auto_reconnect: bool,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect.
    pub reconnect_delay_ms: u64,
    /// Upper bound on any reconnect delay.
    pub max_reconnect_delay_ms: u64,
    /// Growth factor between reconnect delays.
    pub backoff_multiplier: f64,
    /// Liveness probe interval.
    pub heartbeat_interval_ms: u64,
    /// Bound on a single connect attempt.
    pub connection_timeout_ms: u64,
    /// Verbose connection logging.
    pub debug: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            token: None,
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_reconnect_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_MULTIPLIER,
            heartbeat_interval_ms: 30_000,
            connection_timeout_ms: 10_000,
            debug: false,
        }
    }
}

// Keeps the token out of logs.
impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("auto_reconnect", &self.auto_reconnect)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("max_reconnect_delay_ms", &self.max_reconnect_delay_ms)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("heartbeat_interval_ms", &self.heartbeat_interval_ms)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("debug", &self.debug)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let s = ConnectionSettings {
            token: Some("s3cr3t".into()),
            ..ConnectionSettings::default()
        };
        let out = format!("{s:?}");
        assert!(!out.contains("s3cr3t"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn token_omitted_when_absent() {
        let v = serde_json::to_value(ConnectionSettings::default()).unwrap();
        assert!(v.get("token").is_none());
    }
}
