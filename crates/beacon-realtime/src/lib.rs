//! # beacon-realtime
//!
//! The protocol layer between the server and entity consumers.
//!
//! - [`Connection`]: state machine owning the single link, heartbeat, and
//!   reconnect schedule
//! - [`Dispatcher`]: event-kind to handler registry that outlives connections
//! - [`SubscriptionManager`]: reference-counted channel set, replayed after
//!   every (re)connect
//! - [`AckGateway`]: fire-and-forget sends and correlated request/reply
//! - [`RealtimeClient`]: one context object bundling all of the above
//!
//! Transports plug in through the [`Transport`] trait. [`WebSocketTransport`]
//! is the production implementation; [`testing::ScriptedTransport`] drives
//! tests on virtual time.

#![deny(unsafe_code)]

pub mod ack;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
mod listeners;
pub mod outbox;
pub mod subscriptions;
pub mod testing;
pub mod transport;
pub mod websocket;

pub use ack::{AckGateway, DEFAULT_ACK_TIMEOUT};
pub use client::RealtimeClient;
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionState, StateChange};
pub use dispatcher::{Dispatcher, HandlerGuard, HandlerId};
pub use listeners::ListenerGuard;
pub use subscriptions::{ChannelLease, SubscriptionManager};
pub use transport::{CloseKind, Transport, TransportLink, TransportSignal};
pub use websocket::WebSocketTransport;
