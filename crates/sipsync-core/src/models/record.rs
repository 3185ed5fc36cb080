//! Queued log record model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;
use crate::models::LogPayload;

/// Identifier of a queued record, doubling as the remote idempotency key.
///
/// Generated ids are UUID v7 (time-sortable); any non-empty string parses so
/// ids minted elsewhere can be carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("record id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Which queue a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Personal,
    Event,
}

impl LogKind {
    pub const ALL: [Self; 2] = [Self::Personal, Self::Event];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "personal" => Ok(Self::Personal),
            "event" => Ok(Self::Event),
            other => Err(Error::InvalidInput(format!("unknown log kind '{other}'"))),
        }
    }
}

/// Per-record sync lifecycle
///
/// Allowed moves: `pending -> syncing`, `syncing -> synced | failed`,
/// `failed -> syncing`. `synced` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::Failed, Self::Syncing)
                | (Self::Syncing, Self::Synced | Self::Failed)
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Database(format!("unknown sync status '{other}'"))),
        }
    }
}

/// A log entry waiting in the local queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedLogRecord {
    pub id: RecordId,
    pub kind: LogKind,
    pub payload: LogPayload,
    pub sync_status: SyncStatus,
    /// Failed submission attempts so far
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// Set when the last failure was permanent; auto-sync leaves these alone
    pub terminal: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last submission attempt (Unix ms)
    pub last_attempt_at: Option<i64>,
}

impl QueuedLogRecord {
    /// Create a new pending record for the payload
    #[must_use]
    pub fn new(payload: LogPayload) -> Self {
        Self::with_id(RecordId::new(), payload)
    }

    /// Create a pending record with a caller-chosen id
    #[must_use]
    pub fn with_id(id: RecordId, payload: LogPayload) -> Self {
        Self {
            id,
            kind: payload.kind(),
            payload,
            sync_status: SyncStatus::Pending,
            attempt_count: 0,
            last_error: None,
            terminal: false,
            created_at: chrono::Utc::now().timestamp_millis(),
            last_attempt_at: None,
        }
    }

    /// Whether a sync run started at `now_ms` should submit this record.
    pub fn is_due(&self, now_ms: i64, cooldown_ms: i64) -> bool {
        match self.sync_status {
            SyncStatus::Pending => true,
            SyncStatus::Failed if !self.terminal => self
                .last_attempt_at
                .is_none_or(|attempted| now_ms.saturating_sub(attempted) >= cooldown_ms),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DrinkLog, DrinkRef};

    fn payload() -> LogPayload {
        let drink = DrinkRef::new("lager-330", 330, 5.0);
        LogPayload::Personal(DrinkLog::new("u1", &drink, 1, 0, None).unwrap())
    }

    #[test]
    fn test_record_id_unique() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn test_record_id_parse() {
        let id: RecordId = " p1 ".parse().unwrap();
        assert_eq!(id.as_str(), "p1");
        assert!("   ".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_allowed_transitions() {
        use SyncStatus::{Failed, Pending, Synced, Syncing};

        assert!(Pending.can_transition_to(Syncing));
        assert!(Syncing.can_transition_to(Synced));
        assert!(Syncing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Syncing));

        assert!(!Synced.can_transition_to(Pending));
        assert!(!Synced.can_transition_to(Syncing));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Synced));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = QueuedLogRecord::new(payload());
        assert_eq!(record.kind, LogKind::Personal);
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.attempt_count, 0);
        assert!(record.created_at > 0);
    }

    #[test]
    fn test_is_due_respects_cooldown_and_terminal_flag() {
        let mut record = QueuedLogRecord::new(payload());
        assert!(record.is_due(1_000, 30_000));

        record.sync_status = SyncStatus::Failed;
        record.last_attempt_at = Some(1_000);
        assert!(!record.is_due(20_000, 30_000));
        assert!(record.is_due(31_000, 30_000));

        record.terminal = true;
        assert!(!record.is_due(1_000_000, 30_000));

        record.terminal = false;
        record.sync_status = SyncStatus::Syncing;
        assert!(!record.is_due(1_000_000, 0));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Event".parse::<LogKind>().unwrap(), LogKind::Event);
        assert!("group".parse::<LogKind>().is_err());
    }
}
