//! Request/acknowledgment gateway.
//!
//! `send` is fire-and-forget. `send_with_ack` tags the outgoing `emit` with a
//! fresh correlation ID and races the matching `ack` frame against a timer.
//! The pending entry is owned by a guard, so it is removed whether the call
//! resolves, is rejected, times out, or is dropped mid-flight. Nothing here
//! retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use beacon_core::errors::{RealtimeError, Result};
use beacon_core::ids::CorrelationId;
use beacon_core::wire::ClientMessage;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

use crate::outbox::Outbox;

/// Timeout used when the caller has no preference.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(5000);

type Reply = std::result::Result<Value, String>;
type PendingMap = Arc<Mutex<HashMap<CorrelationId, oneshot::Sender<Reply>>>>;

/// Correlates outgoing messages with their replies.
#[derive(Clone, Debug, Default)]
pub struct AckGateway {
    outbox: Outbox,
    pending: PendingMap,
}

impl AckGateway {
    /// Create a gateway sending through `outbox`.
    pub fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            pending: PendingMap::default(),
        }
    }

    /// Send without expecting a reply. `false` when disconnected.
    pub fn send(&self, event: &str, data: Value) -> bool {
        self.outbox.send(&ClientMessage::Emit {
            event: event.to_string(),
            data,
            id: None,
        })
    }

    /// Send and wait for the correlated reply, at most `timeout`.
    #[instrument(skip(self, data))]
    pub async fn send_with_ack(&self, event: &str, data: Value, timeout: Duration) -> Result<Value> {
        if !self.outbox.is_open() {
            return Err(RealtimeError::NotConnected);
        }

        let id = CorrelationId::generate();
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.lock().insert(id.clone(), tx);
        let _entry = PendingEntry {
            pending: Arc::clone(&self.pending),
            id: id.clone(),
        };

        let sent = self.outbox.send(&ClientMessage::Emit {
            event: event.to_string(),
            data,
            id: Some(id.clone()),
        });
        if !sent {
            return Err(RealtimeError::NotConnected);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(RealtimeError::AckRejected {
                event: event.to_string(),
                message,
            }),
            // Sender dropped without a reply; only happens if the entry was
            // cleared out from under us.
            Ok(Err(_)) => Err(RealtimeError::NotConnected),
            Err(_) => {
                debug!(%id, "ack timed out");
                Err(RealtimeError::AckTimeout {
                    event: event.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// [`send_with_ack`](Self::send_with_ack) with [`DEFAULT_ACK_TIMEOUT`].
    pub async fn request(&self, event: &str, data: Value) -> Result<Value> {
        self.send_with_ack(event, data, DEFAULT_ACK_TIMEOUT).await
    }

    /// Settle a pending call from an inbound `ack` frame. Returns `false`
    /// for unknown or already-settled IDs.
    pub(crate) fn settle(&self, id: &CorrelationId, data: Value, error: Option<String>) -> bool {
        let Some(tx) = self.pending.lock().remove(id) else {
            warn!(%id, "ack for unknown correlation id");
            return false;
        };
        let reply = match error {
            Some(message) => Err(message),
            None => Ok(data),
        };
        tx.send(reply).is_ok()
    }

    /// Calls still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether `id` is still waiting for a reply.
    pub fn is_pending(&self, id: &CorrelationId) -> bool {
        self.pending.lock().contains_key(id)
    }
}

/// Removes one pending entry when the waiting call ends.
struct PendingEntry {
    pending: PendingMap,
    id: CorrelationId,
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        let _ = self.pending.lock().remove(&self.id);
    }
}
