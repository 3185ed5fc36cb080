//! Error types for sipsync-core

use thiserror::Error;

use crate::models::SyncStatus;

/// Result type alias using sipsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sipsync-core operations
///
/// Every variant except `InvalidInput` and `IllegalTransition` means local
/// storage could not be used. Callers of `enqueue` must surface those to the
/// user, since the write was not queued at all.
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Queued record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record status change that the queue lifecycle does not allow
    #[error("Illegal sync status transition for {id}: {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: SyncStatus,
        to: SyncStatus,
    },
}

impl Error {
    /// Whether the error comes from local persistence rather than bad input.
    pub const fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::LibSql(_) | Self::Io(_) | Self::Serialization(_)
        )
    }
}
