//! Log queue repository implementation

use crate::error::{Error, Result};
use crate::models::{LogKind, LogPayload, QueuedLogRecord, RecordId, SyncStatus};
use libsql::Connection;

const RECORD_COLUMNS: &str = "id, kind, payload, sync_status, attempt_count, last_error, terminal, created_at, last_attempt_at";

/// Trait for queue storage operations (async)
///
/// Every method is a single statement or a read followed by a guarded
/// update, so callers only need to serialize access to the connection.
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Append a new record
    async fn insert(&self, record: &QueuedLogRecord) -> Result<()>;

    /// Get a record by ID
    async fn get(&self, id: &RecordId) -> Result<Option<QueuedLogRecord>>;

    /// List records of one kind in one status, oldest first
    async fn list(&self, kind: LogKind, status: SyncStatus) -> Result<Vec<QueuedLogRecord>>;

    /// Count records of one kind in one status
    async fn count(&self, kind: LogKind, status: SyncStatus) -> Result<usize>;

    /// Move a pending or failed record to `syncing`
    async fn mark_syncing(&self, id: &RecordId, now_ms: i64) -> Result<()>;

    /// Move a syncing record to `synced`; returns false when the record is gone
    async fn mark_synced(&self, id: &RecordId) -> Result<bool>;

    /// Move a syncing record to `failed`, bumping its attempt count
    async fn mark_failed(
        &self,
        id: &RecordId,
        error: &str,
        terminal: bool,
        now_ms: i64,
    ) -> Result<()>;

    /// Delete a synced record; absent records are ignored
    async fn remove(&self, id: &RecordId) -> Result<()>;

    /// Mark a syncing record synced and delete it in one transaction
    async fn complete(&self, id: &RecordId) -> Result<bool>;

    /// Delete a failed record the user gave up on
    async fn discard(&self, id: &RecordId) -> Result<()>;

    /// Clear the terminal flag and cool-down of a failed record
    async fn clear_terminal(&self, id: &RecordId) -> Result<()>;

    /// Fail every record stuck in `syncing`; returns how many were touched
    async fn recover_interrupted(&self) -> Result<u64>;

    /// Delete `synced` rows left behind by a crash; returns how many
    async fn purge_synced(&self) -> Result<u64>;

    /// IDs starting with `prefix`, oldest first, at most `limit`
    async fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a record from a database row
    fn parse_record(row: &libsql::Row) -> Result<QueuedLogRecord> {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let payload: String = row.get(2)?;
        let sync_status: String = row.get(3)?;
        let attempt_count: i64 = row.get(4)?;

        let kind: LogKind = kind.parse()?;
        let payload: LogPayload = serde_json::from_str(&payload)?;
        if payload.kind() != kind {
            return Err(Error::Database(format!(
                "record {id} is stored as {kind} but carries a {} payload",
                payload.kind()
            )));
        }

        Ok(QueuedLogRecord {
            id: id.parse()?,
            kind,
            payload,
            sync_status: sync_status.parse()?,
            attempt_count: u32::try_from(attempt_count)
                .map_err(|_| Error::Database(format!("invalid attempt count {attempt_count}")))?,
            last_error: row.get(5)?,
            terminal: row.get::<i64>(6)? != 0,
            created_at: row.get(7)?,
            last_attempt_at: row.get(8)?,
        })
    }

    /// Load the current status, rejecting moves the lifecycle forbids
    async fn check_transition(&self, id: &RecordId, next: SyncStatus) -> Result<SyncStatus> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?
            .sync_status;

        if current.can_transition_to(next) {
            Ok(current)
        } else {
            Err(Error::IllegalTransition {
                id: id.to_string(),
                from: current,
                to: next,
            })
        }
    }

    async fn status_of(&self, id: &RecordId) -> Result<Option<SyncStatus>> {
        let mut rows = self
            .conn
            .query(
                "SELECT sync_status FROM log_queue WHERE id = ?",
                libsql::params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?.parse()?)),
            None => Ok(None),
        }
    }

    fn ensure_updated(rows: u64, id: &RecordId) -> Result<()> {
        if rows == 0 {
            Err(Error::Database(format!(
                "record {id} changed while its status was being updated"
            )))
        } else {
            Ok(())
        }
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn insert(&self, record: &QueuedLogRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;

        self.conn
            .execute(
                "INSERT INTO log_queue (id, kind, payload, sync_status, attempt_count, last_error, terminal, created_at, last_attempt_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    record.id.as_str(),
                    record.kind.as_str(),
                    payload,
                    record.sync_status.as_str(),
                    i64::from(record.attempt_count),
                    record.last_error.clone(),
                    i64::from(record.terminal),
                    record.created_at,
                    record.last_attempt_at
                ],
            )
            .await?;

        Ok(())
    }

    async fn get(&self, id: &RecordId) -> Result<Option<QueuedLogRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM log_queue WHERE id = ?"),
                libsql::params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, kind: LogKind, status: SyncStatus) -> Result<Vec<QueuedLogRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS}
                     FROM log_queue
                     WHERE kind = ? AND sync_status = ?
                     ORDER BY seq ASC"
                ),
                libsql::params![kind.as_str(), status.as_str()],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }

        Ok(records)
    }

    async fn count(&self, kind: LogKind, status: SyncStatus) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM log_queue WHERE kind = ? AND sync_status = ?",
                libsql::params![kind.as_str(), status.as_str()],
            )
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };

        usize::try_from(count).map_err(|_| Error::Database(format!("invalid row count {count}")))
    }

    async fn mark_syncing(&self, id: &RecordId, now_ms: i64) -> Result<()> {
        let current = self.check_transition(id, SyncStatus::Syncing).await?;

        let rows = self
            .conn
            .execute(
                "UPDATE log_queue SET sync_status = 'syncing', last_attempt_at = ?
                 WHERE id = ? AND sync_status = ?",
                libsql::params![now_ms, id.as_str(), current.as_str()],
            )
            .await?;

        Self::ensure_updated(rows, id)
    }

    async fn mark_synced(&self, id: &RecordId) -> Result<bool> {
        match self.status_of(id).await? {
            // Duplicate completions are harmless
            None | Some(SyncStatus::Synced) => return Ok(false),
            Some(SyncStatus::Syncing) => {}
            Some(current) => {
                return Err(Error::IllegalTransition {
                    id: id.to_string(),
                    from: current,
                    to: SyncStatus::Synced,
                })
            }
        }

        let rows = self
            .conn
            .execute(
                "UPDATE log_queue SET sync_status = 'synced', last_error = NULL, terminal = 0
                 WHERE id = ? AND sync_status = 'syncing'",
                libsql::params![id.as_str()],
            )
            .await?;

        Self::ensure_updated(rows, id)?;
        Ok(true)
    }

    async fn mark_failed(
        &self,
        id: &RecordId,
        error: &str,
        terminal: bool,
        now_ms: i64,
    ) -> Result<()> {
        self.check_transition(id, SyncStatus::Failed).await?;

        let rows = self
            .conn
            .execute(
                "UPDATE log_queue
                 SET sync_status = 'failed',
                     attempt_count = attempt_count + 1,
                     last_error = ?,
                     terminal = ?,
                     last_attempt_at = ?
                 WHERE id = ? AND sync_status = 'syncing'",
                libsql::params![error, i64::from(terminal), now_ms, id.as_str()],
            )
            .await?;

        Self::ensure_updated(rows, id)
    }

    async fn remove(&self, id: &RecordId) -> Result<()> {
        match self.status_of(id).await? {
            None => Ok(()),
            Some(SyncStatus::Synced) => {
                self.conn
                    .execute(
                        "DELETE FROM log_queue WHERE id = ? AND sync_status = 'synced'",
                        libsql::params![id.as_str()],
                    )
                    .await?;
                Ok(())
            }
            Some(current) => Err(Error::InvalidInput(format!(
                "record {id} is {current}; only synced records can be removed"
            ))),
        }
    }

    async fn complete(&self, id: &RecordId) -> Result<bool> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let outcome = match self.mark_synced(id).await {
            Ok(marked) => self.remove(id).await.map(|()| marked),
            Err(e) => Err(e),
        };
        let marked = match outcome {
            Ok(marked) => marked,
            Err(e) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e);
            }
        };

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(marked)
    }

    async fn discard(&self, id: &RecordId) -> Result<()> {
        match self.status_of(id).await? {
            None => Err(Error::NotFound(id.to_string())),
            Some(SyncStatus::Failed) => {
                self.conn
                    .execute(
                        "DELETE FROM log_queue WHERE id = ? AND sync_status = 'failed'",
                        libsql::params![id.as_str()],
                    )
                    .await?;
                Ok(())
            }
            Some(current) => Err(Error::InvalidInput(format!(
                "record {id} is {current}; only failed records can be discarded"
            ))),
        }
    }

    async fn clear_terminal(&self, id: &RecordId) -> Result<()> {
        match self.status_of(id).await? {
            None => Err(Error::NotFound(id.to_string())),
            Some(SyncStatus::Failed) => {
                self.conn
                    .execute(
                        "UPDATE log_queue SET terminal = 0, last_attempt_at = NULL
                         WHERE id = ? AND sync_status = 'failed'",
                        libsql::params![id.as_str()],
                    )
                    .await?;
                Ok(())
            }
            Some(current) => Err(Error::InvalidInput(format!(
                "record {id} is {current}; only failed records can be retried"
            ))),
        }
    }

    async fn recover_interrupted(&self) -> Result<u64> {
        // last_attempt_at keeps the interrupted attempt's timestamp
        let rows = self
            .conn
            .execute(
                "UPDATE log_queue
                 SET sync_status = 'failed',
                     attempt_count = attempt_count + 1,
                     last_error = 'interrupted'
                 WHERE sync_status = 'syncing'",
                (),
            )
            .await?;

        Ok(rows)
    }

    async fn purge_synced(&self) -> Result<u64> {
        let rows = self
            .conn
            .execute("DELETE FROM log_queue WHERE sync_status = 'synced'", ())
            .await?;

        Ok(rows)
    }

    async fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let prefix = prefix.trim();
        if prefix.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // substr avoids LIKE treating `_` and `%` in user input as wildcards
        let prefix_len = i64::try_from(prefix.chars().count())
            .map_err(|_| Error::InvalidInput("ID prefix is too long".into()))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM log_queue
                 WHERE substr(id, 1, ?) = ?
                 ORDER BY seq ASC
                 LIMIT ?",
                libsql::params![prefix_len, prefix, limit],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }

        Ok(ids)
    }
}
