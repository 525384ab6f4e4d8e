//! Sync error types.

use beacon_core::RealtimeError;
use beacon_core::ids::{NotificationId, ReviewId};
use thiserror::Error;

/// Errors raised by consumer actions.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The notification is not in the center's list.
    #[error("unknown notification: {0}")]
    UnknownNotification(NotificationId),
    /// The review is not in the pending-review queue.
    #[error("unknown review: {0}")]
    UnknownReview(ReviewId),
    /// The request could not be delivered or was refused.
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
