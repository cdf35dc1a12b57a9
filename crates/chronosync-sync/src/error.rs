//! Error types for the sync engine.

use thiserror::Error;

use chronosync_core::{CoreError, TransportError};

/// Errors that can occur while running the sync protocol.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Internal bookkeeping went wrong. The operation was aborted and the
    /// engine should not be trusted further.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The registration layer refused the broadcast prefix.
    #[error("registration failed: {0}")]
    Registration(TransportError),

    /// Encoding a sync payload failed.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),

    /// The engine was shut down.
    #[error("sync engine is shut down")]
    Disabled,

    /// Publishing before the engine finished bootstrapping.
    #[error("sync engine is not initialized")]
    NotInitialized,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
