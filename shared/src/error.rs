//! Failure taxonomy for room synchronization.
//!
//! Every recoverable failure in the core maps onto one of these variants.
//! They are surfaced to the single client (or caller) that triggered them;
//! none of them may terminate another client's session. Broadcast delivery
//! failures are deliberately *not* represented here: the hub logs and
//! swallows them, and the broken connection's own receive loop handles
//! cleanup.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The identifier resolved to nothing, or to a soft-deleted room.
    #[error("not found")]
    NotFound,

    /// A structural edit was attempted while the match status forbids it,
    /// or a mutation carried a stale observed version.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed payload or out-of-range field. Local to the offending
    /// message; the connection stays open.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Internal invariant violation (version counter failed to advance
    /// monotonically). Should never occur; not a recoverable user error.
    #[error("state corruption: {0}")]
    StateCorruption(String),
}

impl SyncError {
    /// Stable machine-readable code used in wire error events.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::NotFound => "not_found",
            SyncError::Conflict(_) => "conflict",
            SyncError::Validation(_) => "validation",
            SyncError::StateCorruption(_) => "state_corruption",
        }
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        SyncError::Conflict(detail.into())
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        SyncError::Validation(detail.into())
    }
}
