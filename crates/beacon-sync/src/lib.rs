//! # beacon-sync
//!
//! Entity synchronization consumers: one per record kind, each mirroring
//! server-pushed events into a keyed store and a few derived views.
//!
//! - [`TaskSync`]: task store plus progress map
//! - [`WorkerSync`]: worker store plus liveness and metrics maps
//! - [`WorkflowSync`]: workflow store plus node status map and review queue
//! - [`NotificationCenter`]: persistent notification list, optionally
//!   feeding a [`ToastQueue`]
//!
//! Every consumer activates against a shared
//! [`RealtimeClient`](beacon_realtime::RealtimeClient) and returns an
//! [`Activation`] that tears everything down on drop. Stores are injected
//! through [`EntityStore`]; [`InMemoryStore`] is the bundled implementation.

#![deny(unsafe_code)]

pub mod consumer;
pub mod errors;
pub mod notifications;
pub mod store;
pub mod task;
pub mod toast;
pub mod worker;
pub mod workflow;

pub use consumer::{Activation, Callback, Scope};
pub use errors::{Result, SyncError};
pub use notifications::NotificationCenter;
pub use store::{EntityStore, InMemoryStore};
pub use task::{ProgressEntry, TaskSync, TaskWatch};
pub use toast::{Toast, ToastId, ToastPhase, ToastQueue};
pub use worker::{WorkerSync, WorkerWatch};
pub use workflow::{PendingReview, ReviewDecision, WorkflowSync, WorkflowWatch};
