//! Worker consumer.
//!
//! Besides the record store, keeps two cheap lookups: a liveness map
//! (`worker -> online`) fed by status changes and heartbeats, and the latest
//! metrics snapshot per worker.

use std::collections::HashMap;
use std::sync::Arc;

use beacon_core::Channel;
use beacon_core::entities::{
    EntityKind, EntityRef, NewNotification, NotificationLevel, Worker, WorkerMetrics, WorkerPatch,
    WorkerStatus,
};
use beacon_core::events::{
    WorkerDeleted, WorkerHeartbeat, WorkerMetricsReported, WorkerRegistered, WorkerStatusChanged,
    WorkerUpdated,
};
use beacon_core::ids::WorkerId;
use beacon_realtime::RealtimeClient;
use parking_lot::Mutex;
use tracing::debug;

use crate::consumer::{Activation, Callback, Scope, fire, scoped};
use crate::notifications::NotificationCenter;
use crate::store::EntityStore;

/// What one worker activation follows and which hooks it runs.
#[derive(Clone, Default)]
pub struct WorkerWatch {
    scope: Scope<WorkerId>,
    quiet: bool,
    on_status_changed: Option<Callback<WorkerStatusChanged>>,
    on_metrics: Option<Callback<WorkerMetricsReported>>,
}

impl WorkerWatch {
    /// Every worker, over the `workers` channel.
    pub fn all() -> Self {
        Self::default()
    }

    /// One worker, over `worker:<id>`.
    pub fn worker(id: impl Into<WorkerId>) -> Self {
        Self {
            scope: Scope::One(id.into()),
            ..Self::default()
        }
    }

    /// Do not raise notifications for this activation.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Run `f` on every status change in scope.
    #[must_use]
    pub fn on_status_changed(
        mut self,
        f: impl Fn(&WorkerStatusChanged) + Send + Sync + 'static,
    ) -> Self {
        self.on_status_changed = Some(Arc::new(f));
        self
    }

    /// Run `f` on every metrics report in scope.
    #[must_use]
    pub fn on_metrics(mut self, f: impl Fn(&WorkerMetricsReported) + Send + Sync + 'static) -> Self {
        self.on_metrics = Some(Arc::new(f));
        self
    }

    fn channel(&self) -> Channel {
        match &self.scope {
            Scope::All => Channel::workers(),
            Scope::One(id) => Channel::worker(id),
        }
    }
}

struct Inner {
    store: Arc<dyn EntityStore<Worker>>,
    liveness: Mutex<HashMap<WorkerId, bool>>,
    metrics: Mutex<HashMap<WorkerId, WorkerMetrics>>,
    notifications: Option<NotificationCenter>,
}

impl Inner {
    fn set_online(&self, id: &WorkerId, online: bool) -> Option<bool> {
        self.liveness.lock().insert(id.clone(), online)
    }

    fn registered(&self, e: &WorkerRegistered) {
        let _ = self.set_online(&e.worker.id, e.worker.status.is_online());
        if let Some(metrics) = &e.worker.metrics {
            let _ = self.metrics.lock().insert(e.worker.id.clone(), metrics.clone());
        }
        self.store.set(e.worker.clone());
        self.store.invalidate_listings();
    }

    fn updated(&self, e: &WorkerUpdated) {
        let _ = self.store.merge(&e.worker_id, &e.changes);
        if let Some(status) = e.changes.status {
            let _ = self.set_online(&e.worker_id, status.is_online());
        }
        if let Some(metrics) = &e.changes.metrics {
            let _ = self.metrics.lock().insert(e.worker_id.clone(), metrics.clone());
        }
    }

    fn deleted(&self, e: &WorkerDeleted) {
        let _ = self.store.remove(&e.worker_id);
        let _ = self.liveness.lock().remove(&e.worker_id);
        let _ = self.metrics.lock().remove(&e.worker_id);
    }

    fn status_changed(&self, e: &WorkerStatusChanged, notify: bool) {
        let patch = WorkerPatch {
            status: Some(e.new_status),
            ..WorkerPatch::default()
        };
        let _ = self.store.merge(&e.worker_id, &patch);
        let was_online = self.set_online(&e.worker_id, e.new_status.is_online());
        debug!(worker = %e.worker_id, status = ?e.new_status, "worker status changed");

        if !notify {
            return;
        }
        match e.new_status {
            WorkerStatus::Offline if was_online != Some(false) => self.raise(
                NotificationLevel::Warning,
                "Worker Offline",
                format!("{} stopped responding", self.name(&e.worker_id)),
                &e.worker_id,
            ),
            WorkerStatus::Error => self.raise(
                NotificationLevel::Error,
                "Worker Error",
                format!("{} reported a fault", self.name(&e.worker_id)),
                &e.worker_id,
            ),
            _ => {}
        }
    }

    fn metrics_reported(&self, e: &WorkerMetricsReported) {
        let patch = WorkerPatch {
            metrics: Some(e.metrics.clone()),
            ..WorkerPatch::default()
        };
        let _ = self.store.merge(&e.worker_id, &patch);
        let _ = self.metrics.lock().insert(e.worker_id.clone(), e.metrics.clone());
    }

    fn heartbeat(&self, e: &WorkerHeartbeat) {
        // Only a server timestamp is recorded; an untimed beat just proves
        // the worker is up.
        if let Some(at) = e.timestamp {
            let patch = WorkerPatch {
                last_heartbeat: Some(at),
                ..WorkerPatch::default()
            };
            let _ = self.store.merge(&e.worker_id, &patch);
        }
        let _ = self.set_online(&e.worker_id, true);
    }

    fn name(&self, id: &WorkerId) -> String {
        self.store
            .get(id)
            .map_or_else(|| format!("Worker {id}"), |w| w.name)
    }

    fn raise(&self, level: NotificationLevel, title: &str, message: String, id: &WorkerId) {
        if let Some(center) = &self.notifications {
            let _ = center.add(
                NewNotification::new(level, title)
                    .message(message)
                    .about(EntityRef::new(EntityKind::Worker, id.as_str())),
            );
        }
    }
}

/// Keeps a worker store, liveness map, and metrics map in step with
/// worker events.
#[derive(Clone)]
pub struct WorkerSync {
    inner: Arc<Inner>,
}

impl WorkerSync {
    /// Write into `store` without raising notifications.
    pub fn new(store: Arc<dyn EntityStore<Worker>>) -> Self {
        Self::build(store, None)
    }

    /// Write into `store` and raise offline/fault notifications.
    pub fn with_notifications(
        store: Arc<dyn EntityStore<Worker>>,
        notifications: NotificationCenter,
    ) -> Self {
        Self::build(store, Some(notifications))
    }

    fn build(
        store: Arc<dyn EntityStore<Worker>>,
        notifications: Option<NotificationCenter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                liveness: Mutex::new(HashMap::new()),
                metrics: Mutex::new(HashMap::new()),
                notifications,
            }),
        }
    }

    /// Subscribe and start applying events.
    pub fn activate(&self, client: &RealtimeClient, watch: WorkerWatch) -> Activation {
        let notify = !watch.quiet;
        let scope = &watch.scope;
        let mut handlers = Vec::with_capacity(6);

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkerRegistered| e.worker.id.clone(),
            move |e| inner.registered(e),
        ));

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkerUpdated| e.worker_id.clone(),
            move |e| inner.updated(e),
        ));

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkerDeleted| e.worker_id.clone(),
            move |e| inner.deleted(e),
        ));

        let inner = Arc::clone(&self.inner);
        let hook = watch.on_status_changed.clone();
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkerStatusChanged| e.worker_id.clone(),
            move |e| {
                inner.status_changed(e, notify);
                fire(hook.as_ref(), e);
            },
        ));

        let inner = Arc::clone(&self.inner);
        let hook = watch.on_metrics.clone();
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkerMetricsReported| e.worker_id.clone(),
            move |e| {
                inner.metrics_reported(e);
                fire(hook.as_ref(), e);
            },
        ));

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(
            client,
            scope,
            |e: &WorkerHeartbeat| e.worker_id.clone(),
            move |e| inner.heartbeat(e),
        ));

        Activation::new(handlers, client.lease([watch.channel()]))
    }

    /// The store this consumer writes to.
    pub fn store(&self) -> &Arc<dyn EntityStore<Worker>> {
        &self.inner.store
    }

    /// Whether the worker is reachable. `None` if nothing has been heard.
    pub fn is_online(&self, id: &WorkerId) -> Option<bool> {
        self.inner.liveness.lock().get(id).copied()
    }

    /// Liveness of every worker heard from.
    pub fn liveness(&self) -> HashMap<WorkerId, bool> {
        self.inner.liveness.lock().clone()
    }

    /// Workers currently reachable, sorted.
    pub fn online_workers(&self) -> Vec<WorkerId> {
        let mut online: Vec<WorkerId> = self
            .inner
            .liveness
            .lock()
            .iter()
            .filter_map(|(id, up)| up.then(|| id.clone()))
            .collect();
        online.sort();
        online
    }

    /// Latest metrics for a worker.
    pub fn metrics(&self, id: &WorkerId) -> Option<WorkerMetrics> {
        self.inner.metrics.lock().get(id).cloned()
    }
}

impl std::fmt::Debug for WorkerSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSync")
            .field("known", &self.inner.liveness.lock().len())
            .field("notifications", &self.inner.notifications.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use beacon_core::ServerEvent;
    use beacon_realtime::testing::ScriptedTransport;
    use chrono::{TimeZone, Utc};

    struct Fixture {
        client: RealtimeClient,
        store: Arc<InMemoryStore<Worker>>,
        center: NotificationCenter,
        sync: WorkerSync,
    }

    impl Fixture {
        fn emit(&self, event: impl Into<ServerEvent>) {
            let _ = self.client.dispatcher().dispatch(&event.into());
        }
    }

    fn fixture() -> Fixture {
        let client = RealtimeClient::new(ScriptedTransport::new());
        let store = Arc::new(InMemoryStore::new());
        let center = NotificationCenter::default();
        let sync = WorkerSync::with_notifications(store.clone(), center.clone());
        Fixture {
            client,
            store,
            center,
            sync,
        }
    }

    fn id(s: &str) -> WorkerId {
        WorkerId::from(s)
    }

    fn online_worker(s: &str) -> Worker {
        let mut w = Worker::new(s, format!("runner {s}"));
        w.status = WorkerStatus::Idle;
        w
    }

    #[test]
    fn registration_seeds_liveness() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, WorkerWatch::all());
        f.emit(WorkerRegistered {
            worker: online_worker("w1"),
        });
        f.emit(WorkerRegistered {
            worker: Worker::new("w2", "cold"),
        });
        assert_eq!(f.sync.is_online(&id("w1")), Some(true));
        assert_eq!(f.sync.is_online(&id("w2")), Some(false));
        assert_eq!(f.sync.online_workers(), vec![id("w1")]);
        assert_eq!(f.store.len(), 2);
    }

    #[test]
    fn liveness_tracks_unknown_workers_too() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, WorkerWatch::all().quiet());
        f.emit(WorkerHeartbeat {
            worker_id: id("ghost"),
            timestamp: None,
        });
        assert_eq!(f.sync.is_online(&id("ghost")), Some(true));
        assert!(f.store.is_empty());
    }

    #[test]
    fn going_offline_notifies_once() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, WorkerWatch::all());
        f.emit(WorkerRegistered {
            worker: online_worker("w1"),
        });
        for _ in 0..2 {
            f.emit(WorkerStatusChanged {
                worker_id: id("w1"),
                old_status: None,
                new_status: WorkerStatus::Offline,
            });
        }
        assert_eq!(f.sync.is_online(&id("w1")), Some(false));
        assert_eq!(f.store.get(&id("w1")).unwrap().status, WorkerStatus::Offline);
        let notes = f.center.list();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Worker Offline");
        assert_eq!(notes[0].message, "runner w1 stopped responding");
    }

    #[test]
    fn metrics_and_heartbeat_merge() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, WorkerWatch::worker("w1"));
        f.emit(WorkerRegistered {
            worker: online_worker("w1"),
        });
        let metrics = WorkerMetrics {
            cpu_percent: 55.0,
            active_tasks: 2,
            ..WorkerMetrics::default()
        };
        f.emit(WorkerMetricsReported {
            worker_id: id("w1"),
            metrics: metrics.clone(),
        });
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        f.emit(WorkerHeartbeat {
            worker_id: id("w1"),
            timestamp: Some(at),
        });

        assert_eq!(f.sync.metrics(&id("w1")), Some(metrics.clone()));
        let w = f.store.get(&id("w1")).unwrap();
        assert_eq!(w.metrics, Some(metrics));
        assert_eq!(w.last_heartbeat, Some(at));
    }

    #[test]
    fn redelivered_heartbeats_leave_the_record_unchanged() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, WorkerWatch::all().quiet());
        f.emit(WorkerRegistered {
            worker: online_worker("w1"),
        });
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let timed = WorkerHeartbeat {
            worker_id: id("w1"),
            timestamp: Some(at),
        };
        let untimed = WorkerHeartbeat {
            worker_id: id("w1"),
            timestamp: None,
        };

        f.emit(timed.clone());
        f.emit(untimed.clone());
        let first = f.store.get(&id("w1"));
        assert_eq!(first.as_ref().unwrap().last_heartbeat, Some(at));

        std::thread::sleep(std::time::Duration::from_millis(5));
        f.emit(timed);
        f.emit(untimed);
        assert_eq!(f.store.get(&id("w1")), first);
        assert_eq!(f.sync.is_online(&id("w1")), Some(true));
    }

    #[test]
    fn scoped_activation_ignores_other_workers() {
        let f = fixture();
        let a = f.sync.activate(&f.client, WorkerWatch::worker("w1"));
        assert_eq!(a.channels(), &[Channel::worker(&id("w1"))]);
        f.emit(WorkerHeartbeat {
            worker_id: id("w2"),
            timestamp: None,
        });
        assert!(f.sync.liveness().is_empty());
    }

    #[test]
    fn deleted_forgets_everything() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, WorkerWatch::all());
        f.emit(WorkerRegistered {
            worker: online_worker("w1"),
        });
        f.emit(WorkerMetricsReported {
            worker_id: id("w1"),
            metrics: WorkerMetrics::default(),
        });
        f.emit(WorkerDeleted { worker_id: id("w1") });
        assert!(f.store.is_empty());
        assert_eq!(f.sync.is_online(&id("w1")), None);
        assert_eq!(f.sync.metrics(&id("w1")), None);
    }
}
