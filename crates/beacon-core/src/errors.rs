//! Error taxonomy for the realtime layer.
//!
//! - Connection-level failures (`Transport`, `LivenessTimeout`) are
//!   non-fatal: the connection heals itself up to its attempt budget.
//! - `MaxAttemptsExceeded` is terminal until the caller reconnects.
//! - Per-call failures (`AckTimeout`, `AckRejected`, `NotConnected`) go back
//!   to the one caller and never touch connection state.
//!
//! Handler panics are not represented here. They are caught and logged at
//! the dispatch boundary.

use thiserror::Error;

/// Errors surfaced by the realtime layer.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RealtimeError {
    /// Connect failure or abnormal close.
    #[error("transport error: {message}")]
    Transport {
        /// What the transport reported.
        message: String,
        /// Whether reconnecting could help.
        retryable: bool,
    },

    /// No liveness reply within twice the heartbeat interval.
    #[error("no heartbeat reply for {elapsed_ms}ms")]
    LivenessTimeout {
        /// Time since the last reply.
        elapsed_ms: u64,
    },

    /// The reconnect budget ran out.
    #[error("gave up reconnecting after {attempts} attempts")]
    MaxAttemptsExceeded {
        /// Attempts made.
        attempts: u32,
    },

    /// No correlated reply arrived in time.
    #[error("no acknowledgment for '{event}' within {timeout_ms}ms")]
    AckTimeout {
        /// Event that was sent.
        event: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The server replied with an error.
    #[error("'{event}' rejected: {message}")]
    AckRejected {
        /// Event that was sent.
        event: String,
        /// Server-supplied reason.
        message: String,
    },

    /// The operation needs a live connection.
    #[error("not connected")]
    NotConnected,

    /// A frame could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl RealtimeError {
    /// Build a retryable transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::LivenessTimeout { .. } => "LIVENESS_TIMEOUT",
            Self::MaxAttemptsExceeded { .. } => "MAX_ATTEMPTS_EXCEEDED",
            Self::AckTimeout { .. } => "ACK_TIMEOUT",
            Self::AckRejected { .. } => "ACK_REJECTED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the connection stays down until the caller acts.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::MaxAttemptsExceeded { .. } | Self::Transport { retryable: false, .. }
        )
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            RealtimeError::MaxAttemptsExceeded { attempts: 5 }.to_string(),
            "gave up reconnecting after 5 attempts"
        );
        assert_eq!(
            RealtimeError::AckTimeout {
                event: "x".into(),
                timeout_ms: 100
            }
            .to_string(),
            "no acknowledgment for 'x' within 100ms"
        );
    }

    #[test]
    fn codes() {
        assert_eq!(RealtimeError::NotConnected.code(), "NOT_CONNECTED");
        assert_eq!(
            RealtimeError::LivenessTimeout { elapsed_ms: 1 }.code(),
            "LIVENESS_TIMEOUT"
        );
    }

    #[test]
    fn terminal_classification() {
        assert!(RealtimeError::MaxAttemptsExceeded { attempts: 1 }.is_terminal());
        assert!(!RealtimeError::transport("reset").is_terminal());
        assert!(
            RealtimeError::Transport {
                message: "refused".into(),
                retryable: false
            }
            .is_terminal()
        );
        assert!(!RealtimeError::AckTimeout {
            event: "x".into(),
            timeout_ms: 1
        }
        .is_terminal());
    }

    #[test]
    fn from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: RealtimeError = err.into();
        assert_eq!(e.code(), "SERIALIZATION_ERROR");
    }
}
