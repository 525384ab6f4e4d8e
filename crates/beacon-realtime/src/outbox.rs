//! Shared handle to the live link's send side.
//!
//! The connection installs a sender when it reaches CONNECTED and clears it
//! when it leaves. Everything else sends through here, so "connected" and
//! "can send" are the same question.

use std::sync::Arc;

use beacon_core::wire::{ClientMessage, encode_outbound};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Cloneable send handle shared by the connection, subscriptions, and acks.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    inner: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl Outbox {
    /// Create an empty (disconnected) outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the sender for a freshly opened link.
    pub(crate) fn attach(&self, sender: mpsc::UnboundedSender<String>) {
        *self.inner.lock() = Some(sender);
    }

    /// Drop the sender. Dropping the last clone closes the link.
    pub(crate) fn detach(&self) {
        *self.inner.lock() = None;
    }

    /// Whether a live link is installed.
    pub fn is_open(&self) -> bool {
        self.inner.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Encode and hand a message to the link. Returns `false` when there is
    /// no live link or the message cannot be encoded.
    pub fn send(&self, message: &ClientMessage) -> bool {
        let text = match encode_outbound(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(op = message.op(), error = %e, "failed to encode outbound frame");
                return false;
            }
        };
        let guard = self.inner.lock();
        let Some(tx) = guard.as_ref() else {
            debug!(op = message.op(), "dropping outbound frame, not connected");
            return false;
        };
        tx.send(text).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::Channel;

    #[test]
    fn send_without_link_returns_false() {
        let outbox = Outbox::new();
        assert!(!outbox.is_open());
        assert!(!outbox.send(&ClientMessage::Ping));
    }

    #[test]
    fn send_with_link_encodes_json() {
        let outbox = Outbox::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        outbox.attach(tx);
        assert!(outbox.is_open());
        assert!(outbox.send(&ClientMessage::Subscribe {
            channels: vec![Channel::tasks()],
        }));
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame, r#"{"op":"subscribe","channels":["tasks"]}"#);
    }

    #[test]
    fn detach_stops_sends() {
        let outbox = Outbox::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        outbox.attach(tx);
        outbox.detach();
        assert!(!outbox.send(&ClientMessage::Ping));
        // Sender dropped, so the receiver sees the link closed.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_reports_not_open() {
        let outbox = Outbox::new();
        let (tx, rx) = mpsc::unbounded_channel();
        outbox.attach(tx);
        drop(rx);
        assert!(!outbox.is_open());
        assert!(!outbox.send(&ClientMessage::Ping));
    }
}
