//! Listener registries for connection state and errors.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::error;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Ordered set of callbacks receiving `&T`.
pub(crate) struct ListenerSet<T> {
    name: &'static str,
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> ListenerSet<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub(crate) fn add(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerGuard {
        let mut reg = self.inner.lock();
        reg.next_id += 1;
        let id = reg.next_id;
        reg.entries.push((id, Arc::new(callback)));
        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.inner);
        ListenerGuard {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().entries.retain(|(i, _)| *i != id);
                }
            })),
        }
    }

    /// Call every listener in registration order. A panicking listener is
    /// logged and skipped.
    pub(crate) fn emit(&self, value: &T) {
        let snapshot: Vec<Callback<T>> =
            self.inner.lock().entries.iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for cb in snapshot {
            if catch_unwind(AssertUnwindSafe(|| cb(value))).is_err() {
                error!(listener = self.name, "listener panicked");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

/// Removes a state or error listener when dropped.
#[must_use = "dropping the guard removes the listener immediately"]
pub struct ListenerGuard {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ListenerGuard {
    /// Remove the listener now.
    pub fn dispose(mut self) {
        self.run();
    }

    /// Keep the listener for the life of the connection.
    pub fn detach(mut self) {
        self.remove = None;
    }

    fn run(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
