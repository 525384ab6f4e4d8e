//! Channel subscription manager.
//!
//! The client is the source of truth for which channels it wants. Each
//! channel carries a holder count so several consumers can share one
//! channel: the wire sees `subscribe` only when a channel goes from zero
//! holders to one, and `unsubscribe` only when it drops back to zero.
//!
//! While disconnected, changes only touch the tracked set. Every time the
//! connection reaches CONNECTED it replays the whole set as a single
//! `subscribe` frame.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use beacon_core::Channel;
use beacon_core::wire::ClientMessage;
use parking_lot::Mutex;
use tracing::debug;

use crate::outbox::Outbox;

struct Inner {
    outbox: Outbox,
    holders: Mutex<BTreeMap<Channel, usize>>,
}

impl Inner {
    fn subscribe(&self, channels: impl IntoIterator<Item = Channel>) -> Vec<Channel> {
        let mut holders = self.holders.lock();
        let mut added = BTreeSet::new();
        for channel in channels {
            let count = holders.entry(channel.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                let _ = added.insert(channel);
            }
        }
        let added: Vec<Channel> = added.into_iter().collect();
        if !added.is_empty() && self.outbox.is_open() {
            debug!(channels = ?added, "subscribing");
            let _ = self.outbox.send(&ClientMessage::Subscribe {
                channels: added.clone(),
            });
        }
        added
    }

    fn unsubscribe(&self, channels: impl IntoIterator<Item = Channel>) -> Vec<Channel> {
        let mut holders = self.holders.lock();
        let mut released = BTreeSet::new();
        for channel in channels {
            let Some(count) = holders.get_mut(&channel) else {
                continue;
            };
            *count -= 1;
            if *count == 0 {
                let _ = holders.remove(&channel);
                let _ = released.insert(channel);
            }
        }
        let released: Vec<Channel> = released.into_iter().collect();
        if !released.is_empty() && self.outbox.is_open() {
            debug!(channels = ?released, "unsubscribing");
            let _ = self.outbox.send(&ClientMessage::Unsubscribe {
                channels: released.clone(),
            });
        }
        released
    }
}

/// Tracks the desired channel set and keeps the server in step with it.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<Inner>,
}

impl SubscriptionManager {
    /// Create a manager sending through `outbox`.
    pub fn new(outbox: Outbox) -> Self {
        Self {
            inner: Arc::new(Inner {
                outbox,
                holders: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Add one holder to each channel. Returns the channels that were newly
    /// added to the set (and sent, when connected).
    pub fn subscribe(&self, channels: impl IntoIterator<Item = Channel>) -> Vec<Channel> {
        self.inner.subscribe(channels)
    }

    /// Remove one holder from each channel. Returns the channels that left
    /// the set (and were unsubscribed, when connected). Channels that were
    /// never subscribed are ignored.
    pub fn unsubscribe(&self, channels: impl IntoIterator<Item = Channel>) -> Vec<Channel> {
        self.inner.unsubscribe(channels)
    }

    /// Subscribe and get a guard that releases the same channels on drop.
    pub fn lease(&self, channels: impl IntoIterator<Item = Channel>) -> ChannelLease {
        let channels: Vec<Channel> = channels.into_iter().collect();
        let _ = self.inner.subscribe(channels.iter().cloned());
        ChannelLease {
            manager: Arc::downgrade(&self.inner),
            channels,
        }
    }

    /// The tracked set, sorted.
    pub fn subscribed_channels(&self) -> Vec<Channel> {
        self.inner.holders.lock().keys().cloned().collect()
    }

    /// Whether `channel` is in the tracked set.
    pub fn is_subscribed(&self, channel: &Channel) -> bool {
        self.inner.holders.lock().contains_key(channel)
    }

    /// Current holder count for `channel`.
    pub fn holders(&self, channel: &Channel) -> usize {
        self.inner.holders.lock().get(channel).copied().unwrap_or(0)
    }

    /// Send the whole tracked set as one `subscribe` frame. Returns whether
    /// a frame was sent.
    pub(crate) fn replay(&self) -> bool {
        let holders = self.inner.holders.lock();
        if holders.is_empty() {
            return false;
        }
        let channels: Vec<Channel> = holders.keys().cloned().collect();
        debug!(count = channels.len(), "replaying subscriptions");
        self.inner.outbox.send(&ClientMessage::Subscribe { channels })
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("channels", &self.subscribed_channels())
            .finish()
    }
}

/// Holds channels for one consumer and releases them on drop.
#[must_use = "dropping the lease unsubscribes immediately"]
pub struct ChannelLease {
    manager: Weak<Inner>,
    channels: Vec<Channel>,
}

impl ChannelLease {
    /// Channels held by this lease.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Release now.
    pub fn dispose(mut self) {
        self.release();
    }

    /// Hold the channels for the life of the manager.
    pub fn detach(mut self) {
        self.channels.clear();
    }

    fn release(&mut self) {
        if self.channels.is_empty() {
            return;
        }
        let channels = std::mem::take(&mut self.channels);
        if let Some(inner) = self.manager.upgrade() {
            let _ = inner.unsubscribe(channels);
        }
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ChannelLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLease")
            .field("channels", &self.channels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::wire::ClientMessage;
    use tokio::sync::mpsc;

    fn connected() -> (SubscriptionManager, Outbox, mpsc::UnboundedReceiver<String>) {
        let outbox = Outbox::new();
        let (tx, rx) = mpsc::unbounded_channel();
        outbox.attach(tx);
        (SubscriptionManager::new(outbox.clone()), outbox, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    fn ch(name: &str) -> Channel {
        Channel::from(name)
    }

    #[test]
    fn disconnected_subscribe_is_deferred() {
        let manager = SubscriptionManager::new(Outbox::new());
        let added = manager.subscribe([ch("a"), ch("b")]);
        assert_eq!(added, vec![ch("a"), ch("b")]);
        assert_eq!(manager.subscribed_channels(), vec![ch("a"), ch("b")]);
        assert!(!manager.replay());
    }

    #[test]
    fn connected_subscribe_sends_delta_only() {
        let (manager, _outbox, mut rx) = connected();
        let _ = manager.subscribe([ch("a")]);
        let _ = manager.subscribe([ch("a"), ch("b")]);
        assert_eq!(
            drain(&mut rx),
            vec![
                ClientMessage::Subscribe { channels: vec![ch("a")] },
                ClientMessage::Subscribe { channels: vec![ch("b")] },
            ]
        );
    }

    #[test]
    fn second_holder_sends_nothing() {
        let (manager, _outbox, mut rx) = connected();
        let _ = manager.subscribe([ch("a")]);
        let _ = drain(&mut rx);
        assert!(manager.subscribe([ch("a")]).is_empty());
        assert_eq!(manager.holders(&ch("a")), 2);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn unsubscribe_waits_for_last_holder() {
        let (manager, _outbox, mut rx) = connected();
        let _ = manager.subscribe([ch("a")]);
        let _ = manager.subscribe([ch("a")]);
        let _ = drain(&mut rx);

        assert!(manager.unsubscribe([ch("a")]).is_empty());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(manager.unsubscribe([ch("a")]), vec![ch("a")]);
        assert_eq!(
            drain(&mut rx),
            vec![ClientMessage::Unsubscribe { channels: vec![ch("a")] }]
        );
        assert!(!manager.is_subscribed(&ch("a")));
    }

    #[test]
    fn unsubscribe_unknown_channel_is_ignored() {
        let (manager, _outbox, mut rx) = connected();
        assert!(manager.unsubscribe([ch("ghost")]).is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn replay_sends_whole_set_once() {
        let outbox = Outbox::new();
        let manager = SubscriptionManager::new(outbox.clone());
        let _ = manager.subscribe([ch("b"), ch("a")]);
        let _ = manager.subscribe([ch("c")]);
        let _ = manager.unsubscribe([ch("c")]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        outbox.attach(tx);
        assert!(manager.replay());
        assert_eq!(
            drain(&mut rx),
            vec![ClientMessage::Subscribe { channels: vec![ch("a"), ch("b")] }]
        );
    }

    #[test]
    fn lease_releases_on_drop() {
        let (manager, _outbox, mut rx) = connected();
        let lease = manager.lease([ch("task:T1")]);
        assert_eq!(lease.channels(), &[ch("task:T1")]);
        let _ = drain(&mut rx);
        drop(lease);
        assert_eq!(
            drain(&mut rx),
            vec![ClientMessage::Unsubscribe { channels: vec![ch("task:T1")] }]
        );
    }

    #[test]
    fn detached_lease_keeps_channel() {
        let manager = SubscriptionManager::new(Outbox::new());
        manager.lease([ch("tasks")]).detach();
        assert!(manager.is_subscribed(&ch("tasks")));
    }

    #[test]
    fn duplicate_channels_in_one_call_count_twice() {
        let manager = SubscriptionManager::new(Outbox::new());
        assert_eq!(manager.subscribe([ch("a"), ch("a")]), vec![ch("a")]);
        assert_eq!(manager.holders(&ch("a")), 2);
    }
}
