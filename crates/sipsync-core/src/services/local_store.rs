//! Thread-safe wrapper around the local queue database.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::claims::ClaimGuard;
use crate::db::{
    ClaimsRepository, Database, LibSqlClaimsRepository, LibSqlQueueRepository, QueueRepository,
};
use crate::models::{LogKind, QueuedLogRecord, RecordId, SyncStatus};
use crate::util::unix_millis_now;
use crate::{Error, Result};

/// Pending and failed counts for both queues, read under one lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub personal_pending: usize,
    pub personal_failed: usize,
    pub event_pending: usize,
    pub event_failed: usize,
}

impl QueueCounts {
    pub const fn pending(&self, kind: LogKind) -> usize {
        match kind {
            LogKind::Personal => self.personal_pending,
            LogKind::Event => self.event_pending,
        }
    }

    pub const fn failed(&self, kind: LogKind) -> usize {
        match kind {
            LogKind::Personal => self.personal_failed,
            LogKind::Event => self.event_failed,
        }
    }
}

/// Durable record queue plus claim flags.
///
/// One async mutex guards the connection, so `enqueue` from the UI and
/// `mark_*` calls from a running sync never interleave. The lock is only held
/// for the duration of a single queue operation.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::info!("Opened local log queue at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the backing file, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Append a new pending record.
    pub async fn enqueue(&self, record: &QueuedLogRecord) -> Result<RecordId> {
        if record.sync_status != SyncStatus::Pending {
            return Err(Error::InvalidInput(format!(
                "new records must be pending, got {}",
                record.sync_status
            )));
        }

        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.insert(record).await?;
        tracing::debug!("Queued {} log {}", record.kind, record.id);
        Ok(record.id.clone())
    }

    /// Fetch a record by id.
    pub async fn get(&self, id: &RecordId) -> Result<Option<QueuedLogRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.get(id).await
    }

    /// Pending records of one kind, oldest first.
    pub async fn list_pending(&self, kind: LogKind) -> Result<Vec<QueuedLogRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.list(kind, SyncStatus::Pending).await
    }

    /// Failed records of one kind, oldest first, terminal ones included.
    pub async fn list_failed(&self, kind: LogKind) -> Result<Vec<QueuedLogRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.list(kind, SyncStatus::Failed).await
    }

    /// Pending then failed records of one kind, read under one lock.
    pub async fn snapshot(&self, kind: LogKind) -> Result<Vec<QueuedLogRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let mut records = repo.list(kind, SyncStatus::Pending).await?;
        records.extend(repo.list(kind, SyncStatus::Failed).await?);
        Ok(records)
    }

    pub async fn count_pending(&self, kind: LogKind) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.count(kind, SyncStatus::Pending).await
    }

    pub async fn count_failed(&self, kind: LogKind) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.count(kind, SyncStatus::Failed).await
    }

    /// All four counts at once.
    pub async fn counts(&self) -> Result<QueueCounts> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        Ok(QueueCounts {
            personal_pending: repo.count(LogKind::Personal, SyncStatus::Pending).await?,
            personal_failed: repo.count(LogKind::Personal, SyncStatus::Failed).await?,
            event_pending: repo.count(LogKind::Event, SyncStatus::Pending).await?,
            event_failed: repo.count(LogKind::Event, SyncStatus::Failed).await?,
        })
    }

    pub async fn mark_syncing(&self, id: &RecordId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.mark_syncing(id, unix_millis_now()).await
    }

    /// Mark an acknowledged record synced and drop it from the queue.
    ///
    /// Returns false when the record was already gone.
    pub async fn complete(&self, id: &RecordId) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.complete(id).await
    }

    pub async fn mark_failed(&self, id: &RecordId, error: &str, terminal: bool) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.mark_failed(id, error, terminal, unix_millis_now()).await
    }

    /// Make a failed record eligible for the next run, skipping the cool-down.
    pub async fn retry(&self, id: &RecordId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.clear_terminal(id).await
    }

    /// Drop a failed record the user abandoned.
    pub async fn discard(&self, id: &RecordId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.discard(id).await
    }

    /// Fail records left in `syncing` by a run that never finished and drop
    /// acknowledged records that were never removed.
    ///
    /// Only call this while no sync run is in flight.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let purged = repo.purge_synced().await?;
        if purged > 0 {
            tracing::info!("Dropped {purged} acknowledged record(s) left in the queue");
        }
        repo.recover_interrupted().await
    }

    /// Full IDs starting with `prefix`, at most `limit`.
    pub async fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.list_ids_by_prefix(prefix, limit).await
    }
}

#[async_trait]
impl ClaimGuard for LocalStore {
    async fn has_claimed(&self, user_id: &str, event_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlClaimsRepository::new(db.connection());
        repo.has_claimed(user_id, event_id).await
    }

    async fn mark_claimed(&self, user_id: &str, event_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlClaimsRepository::new(db.connection());
        repo.mark_claimed(user_id, event_id, unix_millis_now()).await
    }

    async fn release_claim(&self, user_id: &str, event_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlClaimsRepository::new(db.connection());
        repo.release_claim(user_id, event_id).await
    }
}
