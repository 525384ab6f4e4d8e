//! The realtime context object.
//!
//! [`RealtimeClient`] is constructed once and handed to every consumer. It
//! bundles the connection, dispatcher, subscription manager, and ack
//! gateway; clones share the same instances.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::errors::{RealtimeError, Result};
use beacon_core::{Channel, EventKind, EventPayload, ServerEvent};
use serde_json::Value;

use crate::ack::AckGateway;
use crate::config::ConnectionConfig;
use crate::connection::{Connection, ConnectionState, StateChange};
use crate::dispatcher::{Dispatcher, HandlerGuard, HandlerId};
use crate::listeners::ListenerGuard;
use crate::outbox::Outbox;
use crate::subscriptions::{ChannelLease, SubscriptionManager};
use crate::transport::Transport;
use crate::websocket::WebSocketTransport;

struct Inner {
    connection: Connection,
    dispatcher: Arc<Dispatcher>,
    subscriptions: SubscriptionManager,
    acks: AckGateway,
}

/// Shared handle to the realtime layer.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    /// Build a client over `transport`.
    pub fn new(transport: impl Transport) -> Self {
        Self::with_transport(Arc::new(transport))
    }

    /// Build a client over a shared transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let outbox = Outbox::new();
        let dispatcher = Arc::new(Dispatcher::new());
        let subscriptions = SubscriptionManager::new(outbox.clone());
        let acks = AckGateway::new(outbox.clone());
        let connection = Connection::new(
            transport,
            outbox,
            Arc::clone(&dispatcher),
            subscriptions.clone(),
            acks.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                connection,
                dispatcher,
                subscriptions,
                acks,
            }),
        }
    }

    /// Build a client over the WebSocket transport.
    pub fn websocket() -> Self {
        Self::new(WebSocketTransport::new())
    }

    /// The connection state machine.
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// The event dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// The channel subscription manager.
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.inner.subscriptions
    }

    /// The request/acknowledgment gateway.
    pub fn acks(&self) -> &AckGateway {
        &self.inner.acks
    }

    // ── Connection ──────────────────────────────────────────────────

    /// See [`Connection::connect`].
    pub fn connect(&self, config: ConnectionConfig) {
        self.inner.connection.connect(config);
    }

    /// See [`Connection::disconnect`].
    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    /// See [`Connection::reconnect`].
    pub fn reconnect(&self) -> bool {
        self.inner.connection.reconnect()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Whether the connection is up.
    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Listen for state changes.
    pub fn on_state_change(
        &self,
        listener: impl Fn(&StateChange) + Send + Sync + 'static,
    ) -> ListenerGuard {
        self.inner.connection.on_state_change(listener)
    }

    /// Listen for connection-level errors.
    pub fn on_error(
        &self,
        listener: impl Fn(&RealtimeError) + Send + Sync + 'static,
    ) -> ListenerGuard {
        self.inner.connection.on_error(listener)
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Register a typed handler.
    pub fn on<P, F>(&self, handler: F) -> HandlerGuard
    where
        P: EventPayload,
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on::<P, F>(handler)
    }

    /// Register a handler over the raw event.
    pub fn on_kind<F>(&self, kind: EventKind, handler: F) -> HandlerGuard
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_kind(kind, handler)
    }

    /// Register a handler that runs at most once.
    pub fn once<P, F>(&self, handler: F) -> HandlerGuard
    where
        P: EventPayload,
        F: FnOnce(&P) + Send + 'static,
    {
        self.inner.dispatcher.once::<P, F>(handler)
    }

    /// Remove one handler, or all handlers for `kind`.
    pub fn off(&self, kind: EventKind, id: Option<HandlerId>) -> usize {
        self.inner.dispatcher.off(kind, id)
    }

    // ── Channels ────────────────────────────────────────────────────

    /// Add a holder to each channel.
    pub fn subscribe(&self, channels: impl IntoIterator<Item = Channel>) -> Vec<Channel> {
        self.inner.subscriptions.subscribe(channels)
    }

    /// Remove a holder from each channel.
    pub fn unsubscribe(&self, channels: impl IntoIterator<Item = Channel>) -> Vec<Channel> {
        self.inner.subscriptions.unsubscribe(channels)
    }

    /// Subscribe for the lifetime of the returned lease.
    pub fn lease(&self, channels: impl IntoIterator<Item = Channel>) -> ChannelLease {
        self.inner.subscriptions.lease(channels)
    }

    /// The tracked channel set.
    pub fn subscribed_channels(&self) -> Vec<Channel> {
        self.inner.subscriptions.subscribed_channels()
    }

    // ── Messages ────────────────────────────────────────────────────

    /// Fire-and-forget send.
    pub fn send(&self, event: &str, data: Value) -> bool {
        self.inner.acks.send(event, data)
    }

    /// Send and wait for the correlated reply.
    pub async fn send_with_ack(&self, event: &str, data: Value, timeout: Duration) -> Result<Value> {
        self.inner.acks.send_with_ack(event, data, timeout).await
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("connection", &self.inner.connection)
            .field("channels", &self.subscribed_channels())
            .field("handlers", &self.inner.dispatcher.total_handlers())
            .finish()
    }
}
