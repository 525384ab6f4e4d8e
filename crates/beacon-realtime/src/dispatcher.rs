//! Event dispatcher.
//!
//! Maps [`EventKind`] to an ordered list of handlers. The registry does not
//! depend on any connection, so handlers survive reconnects and even a
//! terminal disconnect.
//!
//! Delivery snapshots the handler list and runs each handler outside the
//! lock, so handlers may register or unregister freely. A panicking handler
//! is logged and the rest still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use beacon_core::{EventKind, EventPayload, ServerEvent};
use parking_lot::Mutex;
use tracing::{error, trace};

type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Identifies one registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(HandlerId, Handler)>>,
}

impl Registry {
    fn remove(&mut self, kind: EventKind, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        let removed = list.len() != before;
        if list.is_empty() {
            let _ = self.handlers.remove(&kind);
        }
        removed
    }
}

/// Event-kind to handler registry.
#[derive(Default)]
pub struct Dispatcher {
    inner: Arc<Mutex<Registry>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one payload type.
    pub fn on<P, F>(&self, handler: F) -> HandlerGuard
    where
        P: EventPayload,
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.insert(P::KIND, |_| -> Handler {
            Arc::new(move |event: &ServerEvent| {
                if let Some(payload) = P::from_event(event) {
                    handler(payload);
                }
            })
        })
    }

    /// Register a handler over the raw event for one kind.
    pub fn on_kind<F>(&self, kind: EventKind, handler: F) -> HandlerGuard
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.insert(kind, |_| -> Handler { Arc::new(handler) })
    }

    /// Register a handler that runs at most once, then unregisters itself.
    pub fn once<P, F>(&self, handler: F) -> HandlerGuard
    where
        P: EventPayload,
        F: FnOnce(&P) + Send + 'static,
    {
        let slot = Mutex::new(Some(handler));
        let fired = AtomicBool::new(false);
        let registry = Arc::downgrade(&self.inner);
        self.insert(P::KIND, move |id| -> Handler {
            Arc::new(move |event: &ServerEvent| {
                let Some(payload) = P::from_event(event) else {
                    return;
                };
                if fired.swap(true, Ordering::AcqRel) {
                    return;
                }
                if let Some(inner) = registry.upgrade() {
                    let _ = inner.lock().remove(P::KIND, id);
                }
                if let Some(handler) = slot.lock().take() {
                    handler(payload);
                }
            })
        })
    }

    /// Remove one handler, or every handler for `kind` when `id` is `None`.
    /// Returns how many were removed.
    pub fn off(&self, kind: EventKind, id: Option<HandlerId>) -> usize {
        let mut reg = self.inner.lock();
        match id {
            Some(id) => usize::from(reg.remove(kind, id)),
            None => reg.handlers.remove(&kind).map_or(0, |list| list.len()),
        }
    }

    /// Deliver an event to every handler registered for its kind, in
    /// registration order. Returns the number of handlers invoked.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Handler> = self
            .inner
            .lock()
            .handlers
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        trace!(kind = kind.as_str(), handlers = snapshot.len(), "dispatching event");
        for handler in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(kind = kind.as_str(), "event handler panicked");
            }
        }
        snapshot.len()
    }

    /// Handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner.lock().handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Handlers registered across all kinds.
    pub fn total_handlers(&self) -> usize {
        self.inner.lock().handlers.values().map(Vec::len).sum()
    }

    fn insert(&self, kind: EventKind, make: impl FnOnce(HandlerId) -> Handler) -> HandlerGuard {
        let mut reg = self.inner.lock();
        reg.next_id += 1;
        let id = HandlerId(reg.next_id);
        let handler = make(id);
        reg.handlers.entry(kind).or_default().push((id, handler));
        HandlerGuard {
            registry: Arc::downgrade(&self.inner),
            kind,
            id,
            armed: true,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.total_handlers())
            .finish()
    }
}

/// Unregisters exactly one handler when dropped.
#[must_use = "dropping the guard unregisters the handler immediately"]
#[derive(Debug)]
pub struct HandlerGuard {
    registry: Weak<Mutex<Registry>>,
    kind: EventKind,
    id: HandlerId,
    armed: bool,
}

impl HandlerGuard {
    /// The registration this guard controls.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// The event kind the handler listens for.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Unregister now.
    pub fn dispose(mut self) {
        self.release();
    }

    /// Keep the handler for the life of the dispatcher.
    pub fn detach(mut self) {
        self.armed = false;
    }

    fn release(&mut self) {
        if !std::mem::replace(&mut self.armed, false) {
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            let _ = inner.lock().remove(self.kind, self.id);
        }
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::events::{TaskCompleted, TaskProgress};
    use beacon_core::ids::TaskId;
    use std::sync::atomic::AtomicUsize;

    fn progress(id: &str, pct: f64) -> ServerEvent {
        ServerEvent::TaskProgress(TaskProgress {
            task_id: TaskId::from(id),
            progress: pct,
            message: None,
        })
    }

    fn completed(id: &str) -> ServerEvent {
        ServerEvent::TaskCompleted(TaskCompleted {
            task_id: TaskId::from(id),
            duration: None,
            result: None,
        })
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let d = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let guards: Vec<HandlerGuard> = (0..3)
            .map(|i| {
                let seen = Arc::clone(&seen);
                d.on::<TaskProgress, _>(move |_| seen.lock().push(i))
            })
            .collect();
        assert_eq!(d.dispatch(&progress("T1", 10.0)), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        drop(guards);
    }

    #[test]
    fn typed_handler_sees_only_its_kind() {
        let d = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _g = d.on::<TaskCompleted, _>(move |p| {
            assert_eq!(p.task_id.as_str(), "T1");
            let _ = h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(d.dispatch(&progress("T1", 1.0)), 0);
        assert_eq!(d.dispatch(&completed("T1")), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let d = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _bad = d.on::<TaskProgress, _>(|_| panic!("handler bug"));
        let _good = d.on::<TaskProgress, _>(move |_| {
            let _ = h.fetch_add(1, Ordering::SeqCst);
        });
        let _ = d.dispatch(&progress("T1", 1.0));
        let _ = d.dispatch(&progress("T1", 2.0));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn once_fires_a_single_time() {
        let d = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let guard = d.once::<TaskCompleted, _>(move |_| {
            let _ = h.fetch_add(1, Ordering::SeqCst);
        });
        let _ = d.dispatch(&completed("T1"));
        let _ = d.dispatch(&completed("T2"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(d.handler_count(EventKind::TaskCompleted), 0);
        // Disposing after it already fired is a no-op.
        guard.dispose();
    }

    #[test]
    fn guard_drop_removes_exactly_one() {
        let d = Dispatcher::new();
        let a = d.on::<TaskProgress, _>(|_| {});
        let _b = d.on::<TaskProgress, _>(|_| {});
        assert_eq!(d.handler_count(EventKind::TaskProgress), 2);
        drop(a);
        assert_eq!(d.handler_count(EventKind::TaskProgress), 1);
    }

    #[test]
    fn detach_keeps_registration() {
        let d = Dispatcher::new();
        d.on::<TaskProgress, _>(|_| {}).detach();
        assert_eq!(d.handler_count(EventKind::TaskProgress), 1);
    }

    #[test]
    fn off_by_id_and_by_kind() {
        let d = Dispatcher::new();
        let a = d.on::<TaskProgress, _>(|_| {});
        let b = d.on::<TaskProgress, _>(|_| {});
        let c = d.on_kind(EventKind::TaskCompleted, |_| {});
        assert_eq!(d.off(EventKind::TaskProgress, Some(a.id())), 1);
        assert_eq!(d.off(EventKind::TaskProgress, Some(a.id())), 0);
        assert_eq!(d.off(EventKind::TaskProgress, None), 1);
        assert_eq!(d.total_handlers(), 1);
        // Guards for already-removed handlers drop cleanly.
        drop((a, b));
        assert_eq!(c.kind(), EventKind::TaskCompleted);
    }

    #[test]
    fn handler_may_unregister_during_dispatch() {
        let d = Arc::new(Dispatcher::new());
        let slot: Arc<Mutex<Option<HandlerGuard>>> = Arc::new(Mutex::new(None));
        let s = Arc::clone(&slot);
        let guard = d.on::<TaskProgress, _>(move |_| {
            drop(s.lock().take());
        });
        *slot.lock() = Some(guard);
        assert_eq!(d.dispatch(&progress("T1", 1.0)), 1);
        assert_eq!(d.handler_count(EventKind::TaskProgress), 0);
    }
}
