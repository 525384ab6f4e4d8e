//! Transport seam.
//!
//! A transport opens one persistent, ordered, bidirectional link per call.
//! Text frames flow out through [`TransportLink::outbound`]; frames and the
//! final close arrive on [`TransportLink::inbound`]. Dropping the outbound
//! sender closes the link from the client side.

use async_trait::async_trait;
use beacon_core::errors::Result;
use tokio::sync::mpsc;

/// WebSocket close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// WebSocket close code for a policy violation (e.g. auth rejected).
pub const CLOSE_POLICY: u16 = 1008;

/// How a link ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseKind {
    /// The server rejected the client by policy (1008). The client must
    /// not reconnect.
    Policy {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Anything else: resets, protocol errors, unexpected codes.
    Abnormal {
        /// What happened.
        reason: String,
    },
}

impl CloseKind {
    /// Classify a close frame by code.
    pub fn from_code(code: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match code {
            CLOSE_POLICY => Self::Policy { code, reason },
            _ => Self::Abnormal {
                reason: format!("closed with code {code}: {reason}"),
            },
        }
    }
}

/// Something the link reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportSignal {
    /// One inbound text frame.
    Frame(String),
    /// The link is gone. Nothing follows this signal.
    Closed(CloseKind),
}

/// An open link.
#[derive(Debug)]
pub struct TransportLink {
    /// Text frames to send.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Inbound frames and the close signal, in delivery order.
    pub inbound: mpsc::UnboundedReceiver<TransportSignal>,
}

/// Opens links to a server.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a link. Failure to open is a `RealtimeError::Transport`.
    async fn open(&self, url: &str, token: Option<&str>) -> Result<TransportLink>;
}
