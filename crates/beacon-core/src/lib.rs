//! # beacon-core
//!
//! Foundation types shared by every Beacon crate.
//!
//! - **Branded IDs**: `TaskId`, `WorkerId`, `WorkflowId`, ... as newtypes
//! - **Channels**: topic names a consumer subscribes to (`tasks`, `task:<id>`, ...)
//! - **Entities**: `Task`, `Worker`, `Workflow`, `Notification` with partial-update patches
//! - **Events**: `ServerEvent`, the closed set of pushed events, tagged by `EventKind`
//! - **Wire frames**: outbound `ClientMessage`, inbound `InboundFrame`
//! - **Errors**: `RealtimeError` covering transport, liveness, and ack failures
//! - **Backoff**: reconnect delay math
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod backoff;
pub mod channel;
pub mod entities;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod wire;

pub use channel::Channel;
pub use errors::RealtimeError;
pub use events::{EventKind, EventPayload, ServerEvent};
