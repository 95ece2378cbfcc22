//! Common error types for Outpost.

use thiserror::Error;

/// Top-level error type for Outpost operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote backend is unreachable or returned a failure.
    ///
    /// Recoverable: the write is queued and replayed later.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Local persistent storage is not usable.
    ///
    /// Recoverable: callers degrade to in-memory-only caching for the
    /// session.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// No remote response and no cache entry for the requested data.
    #[error("Not found offline: {0}")]
    NotFoundOffline(String),

    /// A queued operation exhausted its automatic retries and awaits
    /// manual resolution.
    #[error("Sync exhausted: {0}")]
    SyncExhausted(String),

    /// A sync run was requested while another is in progress.
    #[error("Sync already in progress")]
    SyncInProgress,

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether queuing the write and replaying later can resolve this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RemoteUnavailable(_) | Error::StorageUnavailable(_)
        )
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
