//! Pieces shared by every entity consumer.
//!
//! A consumer activation subscribes one channel and registers a handler per
//! event in its vocabulary. [`Activation`] owns both; dropping it (or
//! calling [`Activation::dispose`]) unregisters the handlers and releases
//! the channel, which the server only hears about once no other activation
//! holds it.

use std::sync::Arc;

use beacon_core::{Channel, EventPayload};
use beacon_realtime::{ChannelLease, HandlerGuard, RealtimeClient};

/// Caller-supplied hook for one event payload.
pub type Callback<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Which records an activation follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope<Id> {
    /// Every record of the kind, through the collective channel.
    All,
    /// A single record, through its own channel.
    One(Id),
}

impl<Id> Default for Scope<Id> {
    fn default() -> Self {
        Self::All
    }
}

impl<Id: PartialEq> Scope<Id> {
    /// Whether events about `id` belong to this scope.
    pub fn admits(&self, id: &Id) -> bool {
        match self {
            Self::All => true,
            Self::One(scoped) => scoped == id,
        }
    }
}

/// Handlers and channel held by one consumer activation.
#[must_use = "dropping the activation tears the consumer down immediately"]
pub struct Activation {
    // Field order is drop order: handlers go before the channel is released.
    handlers: Vec<HandlerGuard>,
    lease: ChannelLease,
}

impl Activation {
    pub(crate) fn new(handlers: Vec<HandlerGuard>, lease: ChannelLease) -> Self {
        Self { handlers, lease }
    }

    /// Channels this activation holds.
    pub fn channels(&self) -> &[Channel] {
        self.lease.channels()
    }

    /// Handlers this activation registered.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Tear down now.
    pub fn dispose(self) {
        let Self { handlers, lease } = self;
        for handler in handlers {
            handler.dispose();
        }
        lease.dispose();
    }
}

impl std::fmt::Debug for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activation")
            .field("channels", &self.lease.channels())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Register a handler that only sees payloads inside `scope`.
pub(crate) fn scoped<P, Id, I, F>(
    client: &RealtimeClient,
    scope: &Scope<Id>,
    id_of: I,
    handler: F,
) -> HandlerGuard
where
    P: EventPayload,
    Id: PartialEq + Clone + Send + Sync + 'static,
    I: Fn(&P) -> Id + Send + Sync + 'static,
    F: Fn(&P) + Send + Sync + 'static,
{
    let scope = scope.clone();
    client.on::<P, _>(move |payload| {
        if scope.admits(&id_of(payload)) {
            handler(payload);
        }
    })
}

/// Run an optional callback.
pub(crate) fn fire<P>(callback: Option<&Callback<P>>, payload: &P) {
    if let Some(callback) = callback {
        callback(payload);
    }
}
