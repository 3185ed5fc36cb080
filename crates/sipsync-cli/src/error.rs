use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] sipsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No user ID given. Pass --user or run `sipsync config init --user <ID>`.")]
    MissingUser,
    #[error(
        "Remote store is not configured. Run `sipsync config init --remote-url <URL>` or set SIPSYNC_REMOTE_URL."
    )]
    RemoteNotConfigured,
    #[error("Invalid timestamp '{0}': expected RFC 3339, e.g. 2024-05-01T21:30:00+09:00")]
    InvalidTimestamp(String),
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Record not found for id/prefix: {0}")]
    RecordNotFound(String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("Could not resolve the {0} directory for this platform")]
    MissingPlatformDir(&'static str),
}
