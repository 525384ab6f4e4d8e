//! Logical wire frames.
//!
//! Outbound frames are tagged by `op`:
//!
//! ```json
//! {"op": "subscribe", "channels": ["tasks", "task:T1"]}
//! {"op": "unsubscribe", "channels": ["task:T1"]}
//! {"op": "ping"}
//! {"op": "emit", "event": "task.retry", "data": {...}, "id": "<correlation id>"}
//! ```
//!
//! Inbound frames are tagged by `type`. Control frames (`pong`, `ack`) are
//! tried first; anything else must be a [`ServerEvent`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::Channel;
use crate::events::ServerEvent;
use crate::ids::CorrelationId;

/// A frame the client sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving events for these channels.
    Subscribe {
        /// Channels to add.
        channels: Vec<Channel>,
    },
    /// Stop receiving events for these channels.
    Unsubscribe {
        /// Channels to drop.
        channels: Vec<Channel>,
    },
    /// Liveness probe.
    Ping,
    /// Application message, optionally expecting a correlated reply.
    Emit {
        /// Application event name.
        event: String,
        /// Event body.
        #[serde(default)]
        data: Value,
        /// Correlation ID when a reply is expected.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<CorrelationId>,
    },
}

impl ClientMessage {
    /// Short name for logging.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Ping => "ping",
            Self::Emit { .. } => "emit",
        }
    }
}

/// Protocol-level inbound frames that never reach consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Liveness reply.
    Pong {
        /// Server clock, when provided.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Reply to an `emit` that carried a correlation ID.
    Ack {
        /// Correlation ID copied from the request.
        id: CorrelationId,
        /// Reply body.
        #[serde(default)]
        data: Value,
        /// Set when the server refused the request.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Any frame the server sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    /// Pong or ack.
    Control(ControlFrame),
    /// A pushed event.
    Event(ServerEvent),
}

/// Parse one inbound text frame.
pub fn parse_inbound(text: &str) -> Result<InboundFrame, serde_json::Error> {
    serde_json::from_str(text)
}

/// Serialize one outbound frame.
pub fn encode_outbound(message: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}
