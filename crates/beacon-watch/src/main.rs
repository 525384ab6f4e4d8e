//! # beacon-watch
//!
//! Connects to the realtime endpoint, activates every entity consumer, and
//! logs what arrives until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use beacon_core::entities::{Task, Worker, Workflow};
use beacon_core::logging;
use beacon_realtime::{ConnectionConfig, RealtimeClient};
use beacon_settings::BeaconSettings;
use beacon_sync::{
    Activation, InMemoryStore, NotificationCenter, TaskSync, TaskWatch, ToastQueue, WorkerSync,
    WorkerWatch, WorkflowSync, WorkflowWatch,
};
use clap::Parser;
use tracing::{info, warn};

/// Follow live task, worker, and workflow events.
#[derive(Parser, Debug)]
#[command(name = "beacon-watch", about = "Follow live task, worker, and workflow events")]
struct Cli {
    /// Realtime endpoint (overrides settings).
    #[arg(long)]
    url: Option<String>,

    /// Bearer token (overrides settings).
    #[arg(long)]
    token: Option<String>,

    /// Settings file (default `~/.beacon/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Base log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Log the connection layer at debug level.
    #[arg(long)]
    debug: bool,

    /// Follow a single task instead of all tasks.
    #[arg(long)]
    task: Option<String>,

    /// Follow a single worker instead of all workers.
    #[arg(long)]
    worker: Option<String>,

    /// Follow a single workflow instead of all workflows.
    #[arg(long)]
    workflow: Option<String>,
}

impl Cli {
    /// Fold command-line overrides into loaded settings.
    fn apply(&self, settings: &mut BeaconSettings) -> Result<()> {
        if let Some(url) = &self.url {
            settings.connection.url.clone_from(url);
        }
        if let Some(token) = &self.token {
            settings.connection.token = Some(token.clone());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.debug {
            settings.connection.debug = true;
        }
        settings.validate().context("Invalid settings after overrides")?;
        Ok(())
    }

    fn task_watch(&self) -> TaskWatch {
        self.task.as_deref().map_or_else(TaskWatch::all, TaskWatch::task)
    }

    fn worker_watch(&self) -> WorkerWatch {
        self.worker
            .as_deref()
            .map_or_else(WorkerWatch::all, WorkerWatch::worker)
    }

    fn workflow_watch(&self) -> WorkflowWatch {
        self.workflow
            .as_deref()
            .map_or_else(WorkflowWatch::all, WorkflowWatch::workflow)
    }
}

fn load(args: &Cli) -> Result<BeaconSettings> {
    let path = args
        .settings
        .clone()
        .unwrap_or_else(beacon_settings::settings_path);
    let mut settings = beacon_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings)?;
    Ok(settings)
}

/// Activate every consumer, each logging what it sees.
fn activate_all(
    args: &Cli,
    client: &RealtimeClient,
    center: &NotificationCenter,
) -> Vec<Activation> {
    let tasks = TaskSync::with_notifications(Arc::new(InMemoryStore::<Task>::new()), center.clone());
    let workers =
        WorkerSync::with_notifications(Arc::new(InMemoryStore::<Worker>::new()), center.clone());
    let workflows =
        WorkflowSync::with_notifications(Arc::new(InMemoryStore::<Workflow>::new()), center.clone());

    let task_watch = args
        .task_watch()
        .on_status_changed(|e| info!(task = %e.task_id, status = ?e.new_status, "task status"))
        .on_progress(|e| info!(task = %e.task_id, progress = e.progress, "task progress"))
        .on_failed(|e| warn!(task = %e.task_id, error = %e.error, "task failed"));
    let worker_watch = args
        .worker_watch()
        .on_status_changed(|e| info!(worker = %e.worker_id, status = ?e.new_status, "worker status"));
    let workflow_watch = args
        .workflow_watch()
        .on_node_updated(|e| {
            info!(workflow = %e.workflow_id, node = %e.node_id, status = ?e.status, "node status");
        })
        .on_review_requested(|e| {
            warn!(workflow = %e.workflow_id, review = %e.review_id, "review requested");
        });

    vec![
        tasks.activate(client, task_watch),
        workers.activate(client, worker_watch),
        workflows.activate(client, workflow_watch),
        center.activate(client),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load(&args)?;

    let directive = logging::filter_directive(&settings.logging.level, settings.connection.debug);
    if settings.logging.json {
        logging::init_json_subscriber(&directive);
    } else {
        logging::init_subscriber(&directive);
    }

    let client = RealtimeClient::websocket();
    let _state = client.on_state_change(|change| {
        info!(from = %change.previous, to = %change.current, "connection state");
    });
    let _errors = client.on_error(|err| warn!(code = err.code(), error = %err, "connection error"));

    let toasts = ToastQueue::new(&settings.toasts);
    let center = NotificationCenter::with_toasts(settings.notifications.clone(), toasts);
    let activations = activate_all(&args, &client, &center);

    client.connect(ConnectionConfig::from_settings(&settings.connection));
    info!(url = %settings.connection.url, channels = ?client.subscribed_channels(), "watching");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down...");
    drop(activations);
    client.disconnect();
    info!(
        notifications = center.len(),
        unread = center.unread_count(),
        "Shutdown complete"
    );
    Ok(())
}
