//! Task consumer.
//!
//! Mirrors task events into an [`EntityStore<Task>`] and keeps a progress
//! map for running tasks. Completion and failure raise user notifications
//! when a [`NotificationCenter`] is attached and the activation asks for
//! them.

use std::collections::HashMap;
use std::sync::Arc;

use beacon_core::Channel;
use beacon_core::entities::{
    EntityKind, EntityRef, NewNotification, NotificationLevel, Task, TaskPatch, TaskStatus,
};
use beacon_core::events::{
    TaskCompleted, TaskCreated, TaskDeleted, TaskFailed, TaskProgress, TaskStatusChanged,
    TaskUpdated,
};
use beacon_core::ids::TaskId;
use beacon_realtime::RealtimeClient;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::consumer::{Activation, Callback, Scope, fire, scoped};
use crate::notifications::NotificationCenter;
use crate::store::EntityStore;

/// Latest progress report for a running task.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEntry {
    /// Completion percentage (0 to 100).
    pub percent: f64,
    /// Step description, if the worker sent one.
    pub message: Option<String>,
}

/// What one task activation follows and which hooks it runs.
#[derive(Clone, Default)]
pub struct TaskWatch {
    scope: Scope<TaskId>,
    quiet: bool,
    on_status_changed: Option<Callback<TaskStatusChanged>>,
    on_progress: Option<Callback<TaskProgress>>,
    on_completed: Option<Callback<TaskCompleted>>,
    on_failed: Option<Callback<TaskFailed>>,
}

impl TaskWatch {
    /// Every task, over the `tasks` channel.
    pub fn all() -> Self {
        Self::default()
    }

    /// One task, over `task:<id>`.
    pub fn task(id: impl Into<TaskId>) -> Self {
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
    pub fn on_status_changed(mut self, f: impl Fn(&TaskStatusChanged) + Send + Sync + 'static) -> Self {
        self.on_status_changed = Some(Arc::new(f));
        self
    }

    /// Run `f` on every progress report in scope.
    #[must_use]
    pub fn on_progress(mut self, f: impl Fn(&TaskProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Run `f` when a task in scope completes.
    #[must_use]
    pub fn on_completed(mut self, f: impl Fn(&TaskCompleted) + Send + Sync + 'static) -> Self {
        self.on_completed = Some(Arc::new(f));
        self
    }

    /// Run `f` when a task in scope fails.
    #[must_use]
    pub fn on_failed(mut self, f: impl Fn(&TaskFailed) + Send + Sync + 'static) -> Self {
        self.on_failed = Some(Arc::new(f));
        self
    }

    fn channel(&self) -> Channel {
        match &self.scope {
            Scope::All => Channel::tasks(),
            Scope::One(id) => Channel::task(id),
        }
    }
}

struct Inner {
    store: Arc<dyn EntityStore<Task>>,
    progress: Mutex<HashMap<TaskId, ProgressEntry>>,
    notifications: Option<NotificationCenter>,
}

impl Inner {
    fn created(&self, e: &TaskCreated) {
        self.store.set(e.task.clone());
        self.store.invalidate_listings();
    }

    fn updated(&self, e: &TaskUpdated) {
        if !self.store.merge(&e.task_id, &e.changes) {
            trace!(task = %e.task_id, "update for unknown task");
        }
    }

    fn deleted(&self, e: &TaskDeleted) {
        let _ = self.store.remove(&e.task_id);
        let _ = self.progress.lock().remove(&e.task_id);
    }

    fn status_changed(&self, e: &TaskStatusChanged) {
        let _ = self.store.merge(&e.task_id, &TaskPatch::status(e.new_status));
        if e.new_status.is_terminal() {
            let _ = self.progress.lock().remove(&e.task_id);
        }
    }

    fn progressed(&self, e: &TaskProgress) {
        let patch = TaskPatch {
            progress: Some(e.progress),
            ..TaskPatch::default()
        };
        let _ = self.store.merge(&e.task_id, &patch);
        let _ = self.progress.lock().insert(
            e.task_id.clone(),
            ProgressEntry {
                percent: e.progress,
                message: e.message.clone(),
            },
        );
    }

    fn completed(&self, e: &TaskCompleted, notify: bool) {
        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            result: e.result.clone(),
            completed_at: self.finish_stamp(&e.task_id),
            ..TaskPatch::default()
        };
        let known = self.store.merge(&e.task_id, &patch);
        let _ = self.progress.lock().remove(&e.task_id);
        debug!(task = %e.task_id, known, duration_ms = e.duration, "task completed");

        if notify {
            let message = match self.title(&e.task_id) {
                Some(title) => format!("{title} finished"),
                None => format!("Task {} finished", e.task_id),
            };
            self.raise(NotificationLevel::Success, "Task Completed", message, &e.task_id);
        }
    }

    fn failed(&self, e: &TaskFailed, notify: bool) {
        let patch = TaskPatch {
            status: Some(TaskStatus::Failed),
            error: Some(e.error.clone()),
            completed_at: self.finish_stamp(&e.task_id),
            ..TaskPatch::default()
        };
        let known = self.store.merge(&e.task_id, &patch);
        let _ = self.progress.lock().remove(&e.task_id);
        debug!(task = %e.task_id, known, error = %e.error, "task failed");

        if notify {
            self.raise(NotificationLevel::Error, "Task Failed", e.error.clone(), &e.task_id);
        }
    }

    /// Stamp only the first finish; a redelivered event leaves it alone.
    fn finish_stamp(&self, id: &TaskId) -> Option<DateTime<Utc>> {
        match self.store.get(id) {
            Some(task) if task.completed_at.is_some() => None,
            _ => Some(Utc::now()),
        }
    }

    fn title(&self, id: &TaskId) -> Option<String> {
        self.store.get(id).map(|t| t.title)
    }

    fn raise(&self, level: NotificationLevel, title: &str, message: String, id: &TaskId) {
        if let Some(center) = &self.notifications {
            let _ = center.add(
                NewNotification::new(level, title)
                    .message(message)
                    .about(EntityRef::new(EntityKind::Task, id.as_str())),
            );
        }
    }
}

/// Keeps a task store in step with task events.
#[derive(Clone)]
pub struct TaskSync {
    inner: Arc<Inner>,
}

impl TaskSync {
    /// Write into `store` without raising notifications.
    pub fn new(store: Arc<dyn EntityStore<Task>>) -> Self {
        Self::build(store, None)
    }

    /// Write into `store` and raise completion/failure notifications on
    /// `notifications`.
    pub fn with_notifications(
        store: Arc<dyn EntityStore<Task>>,
        notifications: NotificationCenter,
    ) -> Self {
        Self::build(store, Some(notifications))
    }

    fn build(store: Arc<dyn EntityStore<Task>>, notifications: Option<NotificationCenter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                progress: Mutex::new(HashMap::new()),
                notifications,
            }),
        }
    }

    /// Subscribe and start applying events.
    pub fn activate(&self, client: &RealtimeClient, watch: TaskWatch) -> Activation {
        let notify = !watch.quiet;
        let scope = &watch.scope;
        let mut handlers = Vec::with_capacity(7);

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(client, scope, |e: &TaskCreated| e.task.id.clone(), move |e| {
            inner.created(e);
        }));

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(client, scope, |e: &TaskUpdated| e.task_id.clone(), move |e| {
            inner.updated(e);
        }));

        let inner = Arc::clone(&self.inner);
        handlers.push(scoped(client, scope, |e: &TaskDeleted| e.task_id.clone(), move |e| {
            inner.deleted(e);
        }));

        let inner = Arc::clone(&self.inner);
        let hook = watch.on_status_changed.clone();
        handlers.push(scoped(
            client,
            scope,
            |e: &TaskStatusChanged| e.task_id.clone(),
            move |e| {
                inner.status_changed(e);
                fire(hook.as_ref(), e);
            },
        ));

        let inner = Arc::clone(&self.inner);
        let hook = watch.on_progress.clone();
        handlers.push(scoped(client, scope, |e: &TaskProgress| e.task_id.clone(), move |e| {
            inner.progressed(e);
            fire(hook.as_ref(), e);
        }));

        let inner = Arc::clone(&self.inner);
        let hook = watch.on_completed.clone();
        handlers.push(scoped(client, scope, |e: &TaskCompleted| e.task_id.clone(), move |e| {
            inner.completed(e, notify);
            fire(hook.as_ref(), e);
        }));

        let inner = Arc::clone(&self.inner);
        let hook = watch.on_failed.clone();
        handlers.push(scoped(client, scope, |e: &TaskFailed| e.task_id.clone(), move |e| {
            inner.failed(e, notify);
            fire(hook.as_ref(), e);
        }));

        Activation::new(handlers, client.lease([watch.channel()]))
    }

    /// The store this consumer writes to.
    pub fn store(&self) -> &Arc<dyn EntityStore<Task>> {
        &self.inner.store
    }

    /// Latest progress for a running task.
    pub fn progress(&self, id: &TaskId) -> Option<ProgressEntry> {
        self.inner.progress.lock().get(id).cloned()
    }

    /// Progress of every task that has reported and not yet finished.
    pub fn progress_map(&self) -> HashMap<TaskId, ProgressEntry> {
        self.inner.progress.lock().clone()
    }
}

impl std::fmt::Debug for TaskSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSync")
            .field("in_progress", &self.inner.progress.lock().len())
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        client: RealtimeClient,
        store: Arc<InMemoryStore<Task>>,
        center: NotificationCenter,
        sync: TaskSync,
    }

    fn fixture() -> Fixture {
        let client = RealtimeClient::new(ScriptedTransport::new());
        let store = Arc::new(InMemoryStore::new());
        let center = NotificationCenter::default();
        let sync = TaskSync::with_notifications(store.clone(), center.clone());
        Fixture {
            client,
            store,
            center,
            sync,
        }
    }

    fn id(s: &str) -> TaskId {
        TaskId::from(s)
    }

    impl Fixture {
        fn emit(&self, event: impl Into<ServerEvent>) -> usize {
            self.client.dispatcher().dispatch(&event.into())
        }
    }

    #[test]
    fn created_inserts_and_invalidates_listings() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, TaskWatch::all());
        f.store.cache_listing("all", vec![]);
        let _ = f.emit(TaskCreated {
            task: Task::new("T1", "build"),
        });
        assert_eq!(f.store.get(&id("T1")).unwrap().title, "build");
        assert!(f.store.listing("all").is_none());
    }

    #[test]
    fn status_for_unknown_task_is_a_noop() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, TaskWatch::all());
        let _ = f.emit(TaskStatusChanged {
            task_id: id("ghost"),
            old_status: None,
            new_status: TaskStatus::Running,
        });
        assert!(f.store.is_empty());
    }

    #[test]
    fn progress_tracks_and_completion_clears() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, TaskWatch::all());
        f.store.set(Task::new("T1", "build"));
        let _ = f.emit(TaskProgress {
            task_id: id("T1"),
            progress: 40.0,
            message: Some("compiling".into()),
        });
        assert_eq!(
            f.sync.progress(&id("T1")),
            Some(ProgressEntry {
                percent: 40.0,
                message: Some("compiling".into())
            })
        );
        assert_eq!(f.store.get(&id("T1")).unwrap().progress, Some(40.0));

        let _ = f.emit(TaskCompleted {
            task_id: id("T1"),
            duration: Some(1200),
            result: None,
        });
        assert!(f.sync.progress_map().is_empty());
        assert_eq!(f.store.get(&id("T1")).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn redelivered_terminal_events_leave_the_record_unchanged() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, TaskWatch::all().quiet());
        f.store.set(Task::new("T1", "build"));
        f.store.set(Task::new("T2", "deploy"));
        let done = TaskCompleted {
            task_id: id("T1"),
            duration: Some(800),
            result: Some(serde_json::json!({"artifacts": 3})),
        };
        let failed = TaskFailed {
            task_id: id("T2"),
            error: "disk full".into(),
        };

        let _ = f.emit(done.clone());
        let _ = f.emit(failed.clone());
        let first = (f.store.get(&id("T1")), f.store.get(&id("T2")));
        assert!(first.0.as_ref().unwrap().completed_at.is_some());

        std::thread::sleep(std::time::Duration::from_millis(5));
        let _ = f.emit(done);
        let _ = f.emit(failed);
        assert_eq!((f.store.get(&id("T1")), f.store.get(&id("T2"))), first);
    }

    #[test]
    fn completion_of_unknown_task_still_notifies_and_fires() {
        let f = fixture();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _a = f.sync.activate(
            &f.client,
            TaskWatch::all().on_completed(move |_| {
                let _ = h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let _ = f.emit(TaskCompleted {
            task_id: id("ghost"),
            duration: None,
            result: None,
        });
        assert!(f.store.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let notes = f.center.list();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].message, "Task ghost finished");
    }

    #[test]
    fn failure_sets_error_and_raises_error_notification() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, TaskWatch::all());
        f.store.set(Task::new("T1", "build"));
        let _ = f.emit(TaskFailed {
            task_id: id("T1"),
            error: "exit 1".into(),
        });
        let task = f.store.get(&id("T1")).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("exit 1"));
        let notes = f.center.list();
        assert_eq!(notes[0].title, "Task Failed");
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].entity, Some(EntityRef::new(EntityKind::Task, "T1")));
    }

    #[test]
    fn quiet_activation_raises_nothing() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, TaskWatch::all().quiet());
        let _ = f.emit(TaskFailed {
            task_id: id("T1"),
            error: "x".into(),
        });
        assert!(f.center.is_empty());
    }

    #[test]
    fn scoped_activation_ignores_other_tasks() {
        let f = fixture();
        let a = f.sync.activate(&f.client, TaskWatch::task("T1"));
        assert_eq!(a.channels(), &[Channel::task(&id("T1"))]);
        let _ = f.emit(TaskCreated {
            task: Task::new("T2", "other"),
        });
        let _ = f.emit(TaskCreated {
            task: Task::new("T1", "mine"),
        });
        assert!(f.store.get(&id("T2")).is_none());
        assert!(f.store.get(&id("T1")).is_some());
    }

    #[test]
    fn deleted_removes_everywhere() {
        let f = fixture();
        let _a = f.sync.activate(&f.client, TaskWatch::all());
        f.store.set(Task::new("T1", "build"));
        f.store.cache_listing("all", vec![id("T1")]);
        let _ = f.emit(TaskProgress {
            task_id: id("T1"),
            progress: 10.0,
            message: None,
        });
        let _ = f.emit(TaskDeleted { task_id: id("T1") });
        assert!(f.store.get(&id("T1")).is_none());
        assert_eq!(f.store.listing("all").unwrap(), Vec::<Task>::new());
        assert!(f.sync.progress(&id("T1")).is_none());
    }

    #[test]
    fn dispose_unregisters_everything() {
        let f = fixture();
        let a = f.sync.activate(&f.client, TaskWatch::all());
        assert_eq!(a.handler_count(), 7);
        a.dispose();
        assert_eq!(f.client.dispatcher().total_handlers(), 0);
        assert_eq!(
            f.emit(TaskCreated {
                task: Task::new("T1", "x")
            }),
            0
        );
        assert!(f.store.is_empty());
    }
}
