//! In-process transport for tests.
//!
//! [`ScriptedTransport`] decides the outcome of each open attempt from a
//! script, records the virtual instant of every attempt, keeps every frame
//! the client sends, and lets the test play the server on the most recent
//! link: push frames, answer pings, close with a chosen code.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::errors::{RealtimeError, Result};
use beacon_core::events::ServerEvent;
use beacon_core::ids::CorrelationId;
use beacon_core::wire::ClientMessage;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::transport::{CloseKind, Transport, TransportLink, TransportSignal};

/// What the next open attempt does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Open a link.
    Accept,
    /// Open a link with these frames already queued for the client.
    AcceptWith(Vec<String>),
    /// Fail with a retryable transport error.
    Fail(String),
    /// Never complete; exercises the connection timeout.
    Hang,
}

struct Link {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: Option<mpsc::UnboundedSender<TransportSignal>>,
}

struct Script {
    plan: VecDeque<OpenOutcome>,
    fallback: OpenOutcome,
    opens: Vec<Instant>,
    tokens: Vec<Option<String>>,
    links: Vec<Link>,
    sent: Vec<String>,
}

impl Script {
    fn drain(&mut self) {
        for link in &mut self.links {
            while let Ok(frame) = link.from_client.try_recv() {
                self.sent.push(frame);
            }
        }
    }

    fn live(&self) -> Option<&mpsc::UnboundedSender<TransportSignal>> {
        self.links.last().and_then(|l| l.to_client.as_ref())
    }
}

/// Scriptable [`Transport`]. Clones share one script.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::with_fallback(OpenOutcome::Accept)
    }
}

impl ScriptedTransport {
    /// Every open succeeds unless scripted otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every open fails unless scripted otherwise.
    pub fn failing() -> Self {
        Self::with_fallback(OpenOutcome::Fail("connection refused".into()))
    }

    /// Use `fallback` once the scripted outcomes run out.
    pub fn with_fallback(fallback: OpenOutcome) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                plan: VecDeque::new(),
                fallback,
                opens: Vec::new(),
                tokens: Vec::new(),
                links: Vec::new(),
                sent: Vec::new(),
            })),
        }
    }

    /// Queue the outcome of the next unscripted open attempt.
    pub fn then(&self, outcome: OpenOutcome) {
        self.script.lock().plan.push_back(outcome);
    }

    /// Replace the outcome used after the queue empties.
    pub fn set_fallback(&self, outcome: OpenOutcome) {
        self.script.lock().fallback = outcome;
    }

    /// Open attempts so far.
    pub fn open_count(&self) -> usize {
        self.script.lock().opens.len()
    }

    /// Virtual instant of every open attempt.
    pub fn open_instants(&self) -> Vec<Instant> {
        self.script.lock().opens.clone()
    }

    /// Gaps between consecutive open attempts.
    pub fn open_gaps(&self) -> Vec<Duration> {
        self.script
            .lock()
            .opens
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }

    /// Token presented on each open attempt.
    pub fn tokens(&self) -> Vec<Option<String>> {
        self.script.lock().tokens.clone()
    }

    /// Every frame the client has sent, across all links.
    pub fn sent_frames(&self) -> Vec<String> {
        let mut script = self.script.lock();
        script.drain();
        script.sent.clone()
    }

    /// Every frame the client has sent, decoded.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.sent_frames()
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }

    /// Only the `subscribe` frames, as channel lists.
    pub fn subscribe_frames(&self) -> Vec<Vec<String>> {
        self.sent_messages()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::Subscribe { channels } => {
                    Some(channels.iter().map(|c| c.as_str().to_string()).collect())
                }
                _ => None,
            })
            .collect()
    }

    /// Number of `ping` frames sent.
    pub fn ping_count(&self) -> usize {
        self.sent_messages()
            .iter()
            .filter(|m| matches!(m, ClientMessage::Ping))
            .count()
    }

    /// Correlation ID of the most recent `emit` that carried one.
    pub fn last_correlation_id(&self) -> Option<CorrelationId> {
        self.sent_messages().into_iter().rev().find_map(|m| match m {
            ClientMessage::Emit { id, .. } => id,
            _ => None,
        })
    }

    /// Push a raw frame on the live link.
    pub fn push_frame(&self, text: impl Into<String>) -> bool {
        let script = self.script.lock();
        script
            .live()
            .is_some_and(|tx| tx.send(TransportSignal::Frame(text.into())).is_ok())
    }

    /// Push a server event on the live link.
    pub fn push_event(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(text) => self.push_frame(text),
            Err(_) => false,
        }
    }

    /// Answer a liveness probe.
    pub fn pong(&self) -> bool {
        self.push_frame(json!({"type": "pong"}).to_string())
    }

    /// Reply to a correlated request.
    pub fn ack(&self, id: &CorrelationId, data: Value) -> bool {
        self.push_frame(json!({"type": "ack", "id": id, "data": data}).to_string())
    }

    /// Refuse a correlated request.
    pub fn reject(&self, id: &CorrelationId, error: &str) -> bool {
        self.push_frame(json!({"type": "ack", "id": id, "error": error}).to_string())
    }

    /// Close the live link with a close frame.
    pub fn close(&self, kind: CloseKind) -> bool {
        let mut script = self.script.lock();
        let Some(link) = script.links.last_mut() else {
            return false;
        };
        let Some(tx) = link.to_client.take() else {
            return false;
        };
        tx.send(TransportSignal::Closed(kind)).is_ok()
    }

    /// Close the live link abnormally.
    pub fn drop_link(&self) -> bool {
        self.close(CloseKind::Abnormal {
            reason: "connection reset".into(),
        })
    }

    /// Whether the client still holds the send side of the live link.
    pub fn client_attached(&self) -> bool {
        let mut script = self.script.lock();
        script.drain();
        script.links.last().is_some_and(|l| !l.from_client.is_closed())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _url: &str, token: Option<&str>) -> Result<TransportLink> {
        let outcome = {
            let mut script = self.script.lock();
            script.opens.push(Instant::now());
            script.tokens.push(token.map(str::to_string));
            let fallback = script.fallback.clone();
            script.plan.pop_front().unwrap_or(fallback)
        };

        let preload = match outcome {
            OpenOutcome::Accept => Vec::new(),
            OpenOutcome::AcceptWith(frames) => frames,
            OpenOutcome::Fail(reason) => return Err(RealtimeError::transport(reason)),
            OpenOutcome::Hang => std::future::pending().await,
        };

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        for frame in preload {
            let _ = in_tx.send(TransportSignal::Frame(frame));
        }
        self.script.lock().links.push(Link {
            from_client: out_rx,
            to_client: Some(in_tx),
        });
        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Let spawned tasks run until they block, advancing the paused clock by 1ms.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn follows_script_then_fallback() {
        let transport = ScriptedTransport::failing();
        transport.then(OpenOutcome::Accept);
        assert!(transport.open("ws://x", None).await.is_ok());
        assert_matches!(
            transport.open("ws://x", Some("t")).await,
            Err(RealtimeError::Transport { .. })
        );
        assert_eq!(transport.open_count(), 2);
        assert_eq!(transport.tokens(), vec![None, Some("t".to_string())]);
    }

    #[tokio::test]
    async fn records_outbound_frames() {
        let transport = ScriptedTransport::new();
        let link = transport.open("ws://x", None).await.unwrap();
        link.outbound.send(r#"{"op":"ping"}"#.into()).unwrap();
        assert_eq!(transport.ping_count(), 1);
        assert!(transport.client_attached());
        drop(link);
        assert!(!transport.client_attached());
    }

    #[tokio::test]
    async fn pushes_to_live_link() {
        let transport = ScriptedTransport::new();
        let mut link = transport.open("ws://x", None).await.unwrap();
        assert!(transport.pong());
        assert!(transport.drop_link());
        assert_matches!(link.inbound.recv().await, Some(TransportSignal::Frame(_)));
        assert_matches!(
            link.inbound.recv().await,
            Some(TransportSignal::Closed(CloseKind::Abnormal { .. }))
        );
        assert!(!transport.pong());
    }

    #[tokio::test]
    async fn preloaded_frames_arrive_first() {
        let transport = ScriptedTransport::new();
        transport.then(OpenOutcome::AcceptWith(vec!["a".into()]));
        let mut link = transport.open("ws://x", None).await.unwrap();
        assert_eq!(link.inbound.recv().await, Some(TransportSignal::Frame("a".into())));
    }
}
