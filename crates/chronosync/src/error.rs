//! Error types for the hosted node.

use chronosync_sync::SyncError;
use thiserror::Error;

/// Errors returned through a [`NodeHandle`](crate::NodeHandle).
#[derive(Debug, Error)]
pub enum NodeError {
    /// The engine rejected the call.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The node task has stopped.
    #[error("node stopped")]
    Stopped,
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
