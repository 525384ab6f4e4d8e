//! End-to-end scenarios: client, consumers, and a scripted server.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::ServerEvent;
use beacon_core::entities::{
    EntityKind, EntityRef, NotificationLevel, Task, TaskStatus, Worker, WorkerStatus,
};
use beacon_core::events::{
    TaskCompleted, TaskFailed, TaskProgress, TaskStatusChanged, WorkerStatusChanged,
};
use beacon_core::ids::{TaskId, WorkerId};
use beacon_core::wire::ClientMessage;
use beacon_core::{Channel, RealtimeError};
use beacon_realtime::testing::{OpenOutcome, ScriptedTransport, settle};
use beacon_realtime::{ConnectionConfig, ConnectionState, RealtimeClient};
use beacon_settings::{NotificationSettings, ToastSettings};
use beacon_sync::{
    EntityStore, InMemoryStore, NotificationCenter, TaskSync, TaskWatch, ToastPhase, ToastQueue,
    WorkerSync, WorkerWatch,
};
use parking_lot::Mutex;
use tokio::time::sleep;

struct Stack {
    transport: ScriptedTransport,
    client: RealtimeClient,
    tasks: Arc<InMemoryStore<Task>>,
    workers: Arc<InMemoryStore<Worker>>,
    toasts: ToastQueue,
    center: NotificationCenter,
    task_sync: TaskSync,
    worker_sync: WorkerSync,
}

fn stack(transport: ScriptedTransport) -> Stack {
    let client = RealtimeClient::new(transport.clone());
    let toasts = ToastQueue::new(&ToastSettings::default());
    let center = NotificationCenter::with_toasts(NotificationSettings::default(), toasts.clone());
    let tasks = Arc::new(InMemoryStore::new());
    let workers = Arc::new(InMemoryStore::new());
    let task_sync = TaskSync::with_notifications(tasks.clone(), center.clone());
    let worker_sync = WorkerSync::with_notifications(workers.clone(), center.clone());
    Stack {
        transport,
        client,
        tasks,
        workers,
        toasts,
        center,
        task_sync,
        worker_sync,
    }
}

impl Stack {
    async fn push(&self, event: impl Into<ServerEvent>) {
        assert!(self.transport.push_event(&event.into()));
        settle().await;
    }
}

fn config() -> ConnectionConfig {
    ConnectionConfig::new("ws://test/ws")
}

fn t1() -> TaskId {
    TaskId::from("T1")
}

#[tokio::test(start_paused = true)]
async fn task_runs_to_completion_with_one_notification() {
    let s = stack(ScriptedTransport::new());
    s.tasks.set(Task::new("T1", "nightly build"));
    let _activation = s.task_sync.activate(&s.client, TaskWatch::task("T1"));

    s.client.connect(config());
    settle().await;
    assert_eq!(s.transport.subscribe_frames(), vec![vec!["task:T1"]]);

    s.push(TaskStatusChanged {
        task_id: t1(),
        old_status: Some(TaskStatus::Queued),
        new_status: TaskStatus::Running,
    })
    .await;
    s.push(TaskProgress {
        task_id: t1(),
        progress: 75.0,
        message: None,
    })
    .await;
    assert!(s.task_sync.progress(&t1()).is_some());

    s.push(TaskCompleted {
        task_id: t1(),
        duration: Some(4200),
        result: None,
    })
    .await;

    assert_eq!(s.tasks.get(&t1()).unwrap().status, TaskStatus::Completed);
    assert!(s.task_sync.progress(&t1()).is_none());
    let completed: Vec<_> = s
        .center
        .list()
        .into_iter()
        .filter(|n| n.title == "Task Completed")
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].entity, Some(EntityRef::new(EntityKind::Task, "T1")));
    assert_eq!(completed[0].message, "nightly build finished");
}

#[tokio::test(start_paused = true)]
async fn completion_for_unfetched_task_still_reaches_handlers() {
    let s = stack(ScriptedTransport::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _activation = s.task_sync.activate(
        &s.client,
        TaskWatch::all().on_completed(move |e| sink.lock().push(e.task_id.clone())),
    );
    s.client.connect(config());
    settle().await;

    s.push(TaskCompleted {
        task_id: TaskId::from("T404"),
        duration: None,
        result: None,
    })
    .await;

    assert!(s.tasks.is_empty());
    assert_eq!(*seen.lock(), vec![TaskId::from("T404")]);
    assert_eq!(s.center.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shared_channel_is_released_by_the_last_holder() {
    let s = stack(ScriptedTransport::new());
    s.client.connect(config());
    settle().await;

    let first = s.task_sync.activate(&s.client, TaskWatch::all());
    let second = s.task_sync.activate(&s.client, TaskWatch::all().quiet());
    assert_eq!(s.transport.subscribe_frames(), vec![vec!["tasks"]]);

    first.dispose();
    let unsubscribes = |t: &ScriptedTransport| {
        t.sent_messages()
            .into_iter()
            .filter(|m| matches!(m, ClientMessage::Unsubscribe { .. }))
            .count()
    };
    assert_eq!(unsubscribes(&s.transport), 0);
    assert_eq!(s.client.dispatcher().total_handlers(), 7);

    second.dispose();
    assert_eq!(unsubscribes(&s.transport), 1);
    assert_eq!(s.client.dispatcher().total_handlers(), 0);
    assert!(s.client.subscribed_channels().is_empty());
}

#[tokio::test(start_paused = true)]
async fn consumer_channels_replay_after_a_dropped_link() {
    let s = stack(ScriptedTransport::new());
    let _tasks = s.task_sync.activate(&s.client, TaskWatch::all());
    let _worker = s.worker_sync.activate(&s.client, WorkerWatch::worker("w1"));
    let _feed = s.center.activate(&s.client);

    s.client.connect(config());
    settle().await;
    assert!(s.transport.drop_link());
    settle().await;
    assert_eq!(s.client.state(), ConnectionState::Reconnecting);

    sleep(Duration::from_millis(1100)).await;
    assert!(s.client.is_connected());
    let expected = vec!["notifications", "tasks", "worker:w1"];
    assert_eq!(s.transport.subscribe_frames(), vec![expected.clone(), expected]);

    // Events on the new link still reach the consumers.
    let mut w1 = Worker::new("w1", "runner");
    w1.status = WorkerStatus::Busy;
    s.workers.set(w1);
    s.push(WorkerStatusChanged {
        worker_id: WorkerId::from("w1"),
        old_status: Some(WorkerStatus::Busy),
        new_status: WorkerStatus::Offline,
    })
    .await;
    assert_eq!(s.worker_sync.is_online(&WorkerId::from("w1")), Some(false));
}

#[tokio::test(start_paused = true)]
async fn failed_task_toast_expires_in_two_phases() {
    let s = stack(ScriptedTransport::new());
    let _activation = s.task_sync.activate(&s.client, TaskWatch::all());
    s.client.connect(config());
    settle().await;

    s.push(TaskFailed {
        task_id: t1(),
        error: "worker lost".into(),
    })
    .await;
    let toasts = s.toasts.visible();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].level, NotificationLevel::Error);
    assert_eq!(toasts[0].message, "worker lost");

    sleep(Duration::from_millis(5001)).await;
    assert_eq!(s.toasts.visible()[0].phase, ToastPhase::Exiting);
    sleep(Duration::from_millis(300)).await;
    assert!(s.toasts.is_empty());
    assert_eq!(s.center.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn consumers_survive_exhausted_budget_and_resume_on_reconnect() {
    let s = stack(ScriptedTransport::failing());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let _errors = s.client.on_error(move |e| sink.lock().push(e.clone()));
    let _activation = s.task_sync.activate(&s.client, TaskWatch::all());

    s.client.connect(config().with_max_attempts(2));
    sleep(Duration::from_secs(10)).await;
    assert_eq!(s.client.state(), ConnectionState::Disconnected);
    assert!(
        errors
            .lock()
            .iter()
            .any(|e| matches!(e, RealtimeError::MaxAttemptsExceeded { .. }))
    );
    assert_eq!(s.client.subscribed_channels(), vec![Channel::tasks()]);

    s.transport.set_fallback(OpenOutcome::Accept);
    assert!(s.client.reconnect());
    settle().await;
    assert!(s.client.is_connected());
    assert_eq!(s.transport.subscribe_frames(), vec![vec!["tasks"]]);

    s.push(TaskFailed {
        task_id: t1(),
        error: "boom".into(),
    })
    .await;
    assert_eq!(s.center.list()[0].title, "Task Failed");
}
