//! Queue draining and outcome classification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{LogKind, QueuedLogRecord};
use crate::remote::{RemoteStore, SubmitError};
use crate::services::LocalStore;
use crate::util::unix_millis_now;
use crate::{Error, Result};

/// Aggregate outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub personal_synced: usize,
    pub event_synced: usize,
    pub personal_failed: usize,
    pub event_failed: usize,
    /// One message per failed record, in submission order
    pub errors: Vec<String>,
}

impl SyncResult {
    fn record_synced(&mut self, kind: LogKind) {
        match kind {
            LogKind::Personal => self.personal_synced += 1,
            LogKind::Event => self.event_synced += 1,
        }
    }

    fn record_failed(&mut self, kind: LogKind, message: &str) {
        match kind {
            LogKind::Personal => self.personal_failed += 1,
            LogKind::Event => self.event_failed += 1,
        }
        self.errors.push(message.to_string());
    }

    pub const fn total_synced(&self) -> usize {
        self.personal_synced + self.event_synced
    }

    pub const fn total_failed(&self) -> usize {
        self.personal_failed + self.event_failed
    }

    /// True when nothing was due.
    pub const fn is_empty(&self) -> bool {
        self.total_synced() == 0 && self.total_failed() == 0
    }
}

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a single remote submission
    pub submit_timeout: Duration,
    /// Minimum gap between attempts on a failed record
    pub retry_cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(15),
            retry_cooldown: Duration::from_secs(30),
        }
    }
}

/// Drains both queues against the remote store, one run at a time.
pub struct SyncEngine {
    store: LocalStore,
    remote: Arc<dyn RemoteStore>,
    config: EngineConfig,
    run_lock: Mutex<()>,
    completed_runs: AtomicU64,
}

impl SyncEngine {
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteStore>, config: EngineConfig) -> Self {
        Self {
            store,
            remote,
            config,
            run_lock: Mutex::new(()),
            completed_runs: AtomicU64::new(0),
        }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn config(&self) -> EngineConfig {
        self.config
    }

    /// Runs that reached the end of their snapshot.
    pub fn completed_runs(&self) -> u64 {
        self.completed_runs.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Submit every due record once.
    ///
    /// Returns `Ok(None)` without touching the queue when another run is in
    /// flight. Per-record failures are reported inside the result; `Err` means
    /// the queue itself could not be read or updated.
    pub async fn sync_all(&self) -> Result<Option<SyncResult>> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::debug!("Sync already in flight; skipping");
            return Ok(None);
        };

        let recovered = self.store.recover_interrupted().await?;
        if recovered > 0 {
            tracing::warn!("Recovered {recovered} record(s) left mid-sync by an earlier run");
        }

        let now = unix_millis_now();
        let cooldown_ms = i64::try_from(self.config.retry_cooldown.as_millis()).unwrap_or(i64::MAX);

        let mut batches = Vec::with_capacity(LogKind::ALL.len());
        for kind in LogKind::ALL {
            let due: Vec<QueuedLogRecord> = self
                .store
                .snapshot(kind)
                .await?
                .into_iter()
                .filter(|record| record.is_due(now, cooldown_ms))
                .collect();
            batches.push(due);
        }

        let mut result = SyncResult::default();
        for record in batches.iter().flatten() {
            self.sync_record(record, &mut result).await?;
        }

        let runs = self.completed_runs.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            "Sync run {runs} finished: personal {}/{} synced, event {}/{} synced",
            result.personal_synced,
            result.personal_synced + result.personal_failed,
            result.event_synced,
            result.event_synced + result.event_failed,
        );
        Ok(Some(result))
    }

    async fn sync_record(&self, record: &QueuedLogRecord, result: &mut SyncResult) -> Result<()> {
        match self.store.mark_syncing(&record.id).await {
            Ok(()) => {}
            // Discarded or retried by the user after the snapshot was taken
            Err(Error::NotFound(_) | Error::IllegalTransition { .. }) => {
                tracing::debug!("Record {} changed since snapshot; skipping", record.id);
                return Ok(());
            }
            Err(error) => return Err(error),
        }

        let submission = self.remote.submit(record.kind, record);
        let outcome = tokio::time::timeout(self.config.submit_timeout, submission)
            .await
            .unwrap_or_else(|_| Err(SubmitError::retryable("timeout")));

        match outcome {
            Ok(()) => {
                self.store.complete(&record.id).await?;
                result.record_synced(record.kind);
                tracing::debug!("Synced {} log {}", record.kind, record.id);
            }
            Err(error) => {
                self.store
                    .mark_failed(&record.id, error.message(), error.is_permanent())
                    .await?;
                result.record_failed(record.kind, error.message());
                if error.is_permanent() {
                    tracing::warn!(
                        "{} log {} rejected permanently: {error}",
                        record.kind,
                        record.id
                    );
                } else {
                    tracing::warn!("{} log {} failed, will retry: {error}", record.kind, record.id);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DrinkLog, DrinkRef, EventLog, LogPayload, RecordId, SyncStatus};
    use crate::testing::InMemoryRemoteStore;
    use pretty_assertions::assert_eq;

    fn personal(id: &str) -> QueuedLogRecord {
        let drink = DrinkRef::new("lager-330", 330, 5.0);
        QueuedLogRecord::with_id(
            id.parse().unwrap(),
            LogPayload::Personal(DrinkLog::new("u1", &drink, 1, 0, None).unwrap()),
        )
    }

    fn event(id: &str) -> QueuedLogRecord {
        let drink = DrinkRef::new("soju-360", 360, 16.5);
        let log = DrinkLog::new("u1", &drink, 2, 0, None).unwrap();
        QueuedLogRecord::with_id(
            id.parse().unwrap(),
            LogPayload::Event(EventLog::new(log, "evt-1", true).unwrap()),
        )
    }

    fn rid(id: &str) -> RecordId {
        id.parse().unwrap()
    }

    fn no_cooldown() -> EngineConfig {
        EngineConfig {
            submit_timeout: Duration::from_secs(5),
            retry_cooldown: Duration::ZERO,
        }
    }

    async fn setup(config: EngineConfig) -> (LocalStore, Arc<InMemoryRemoteStore>, SyncEngine) {
        let store = LocalStore::open_in_memory().await.unwrap();
        let remote = Arc::new(InMemoryRemoteStore::new());
        let engine = SyncEngine::new(store.clone(), remote.clone(), config);
        (store, remote, engine)
    }

    /// Drive a record to `failed` the way a run would.
    async fn fail(store: &LocalStore, id: &str, error: &str, terminal: bool) {
        store.mark_syncing(&rid(id)).await.unwrap();
        store.mark_failed(&rid(id), error, terminal).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mixed_outcome_across_queues() {
        let (store, remote, engine) = setup(no_cooldown()).await;
        store.enqueue(&personal("p1")).await.unwrap();
        store.enqueue(&event("e1")).await.unwrap();
        fail(&store, "e1", "HTTP 502", false).await;
        fail(&store, "e1", "HTTP 502", false).await;
        remote
            .fail_once(&rid("e1"), SubmitError::retryable("timeout"))
            .await;

        let result = engine.sync_all().await.unwrap().unwrap();

        assert_eq!(
            result,
            SyncResult {
                personal_synced: 1,
                event_synced: 0,
                personal_failed: 0,
                event_failed: 1,
                errors: vec!["timeout".to_string()],
            }
        );
        assert!(store.get(&rid("p1")).await.unwrap().is_none());
        let e1 = store.get(&rid("e1")).await.unwrap().unwrap();
        assert_eq!(e1.sync_status, SyncStatus::Failed);
        assert_eq!(e1.attempt_count, 3);
        assert_eq!(e1.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_failure_does_not_block_the_rest() {
        let (store, remote, engine) = setup(EngineConfig::default()).await;
        for id in ["p1", "p2", "p3"] {
            store.enqueue(&personal(id)).await.unwrap();
        }
        remote
            .fail_once(&rid("p2"), SubmitError::retryable("HTTP 503"))
            .await;

        let result = engine.sync_all().await.unwrap().unwrap();

        assert_eq!(result.personal_synced, 2);
        assert_eq!(result.personal_failed, 1);
        assert_eq!(
            remote.submissions().await,
            vec![rid("p1"), rid("p2"), rid("p3")]
        );
        assert!(store.get(&rid("p1")).await.unwrap().is_none());
        assert!(store.get(&rid("p3")).await.unwrap().is_none());
        let p2 = store.get(&rid("p2")).await.unwrap().unwrap();
        assert_eq!(p2.sync_status, SyncStatus::Failed);
        assert_eq!(p2.attempt_count, 1);
        assert!(!p2.terminal);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lost_acknowledgement_is_retried_without_duplicates() {
        let (store, remote, engine) = setup(no_cooldown()).await;
        store.enqueue(&personal("p1")).await.unwrap();
        remote.lose_ack_once(&rid("p1")).await;

        let first = engine.sync_all().await.unwrap().unwrap();
        assert_eq!(first.personal_failed, 1);
        assert_eq!(remote.row_count().await, 1);

        let second = engine.sync_all().await.unwrap().unwrap();
        assert_eq!(second.personal_synced, 1);
        assert_eq!(remote.submission_count().await, 2);
        assert_eq!(remote.row_count().await, 1);
        assert_eq!(store.count_pending(LogKind::Personal).await.unwrap(), 0);
        assert_eq!(store.count_failed(LogKind::Personal).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn permanent_failures_wait_for_manual_retry() {
        let (store, remote, engine) = setup(no_cooldown()).await;
        store.enqueue(&event("e1")).await.unwrap();
        remote
            .fail_once(&rid("e1"), SubmitError::permanent("event evt-1 no longer exists"))
            .await;

        let first = engine.sync_all().await.unwrap().unwrap();
        assert_eq!(first.event_failed, 1);

        let second = engine.sync_all().await.unwrap().unwrap();
        assert!(second.is_empty());
        assert_eq!(remote.submission_count().await, 1);
        assert_eq!(store.count_failed(LogKind::Event).await.unwrap(), 1);
        assert!(store.get(&rid("e1")).await.unwrap().unwrap().terminal);

        store.retry(&rid("e1")).await.unwrap();
        let third = engine.sync_all().await.unwrap().unwrap();
        assert_eq!(third.event_synced, 1);
        assert_eq!(store.count_failed(LogKind::Event).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_retry_skips_the_cooldown() {
        let (store, remote, engine) = setup(EngineConfig::default()).await;
        store.enqueue(&personal("p1")).await.unwrap();
        remote
            .fail_once(&rid("p1"), SubmitError::permanent("drink lager-330 was removed"))
            .await;
        engine.sync_all().await.unwrap().unwrap();

        store.retry(&rid("p1")).await.unwrap();
        let result = engine.sync_all().await.unwrap().unwrap();

        assert_eq!(result.personal_synced, 1);
        assert_eq!(remote.submission_count().await, 2);
        assert!(store.get(&rid("p1")).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_records_respect_cooldown() {
        let (store, remote, engine) = setup(EngineConfig {
            submit_timeout: Duration::from_secs(5),
            retry_cooldown: Duration::from_secs(3600),
        })
        .await;
        store.enqueue(&personal("p1")).await.unwrap();
        remote
            .fail_once(&rid("p1"), SubmitError::retryable("HTTP 500"))
            .await;

        engine.sync_all().await.unwrap().unwrap();
        let second = engine.sync_all().await.unwrap().unwrap();

        assert!(second.is_empty());
        assert_eq!(remote.submission_count().await, 1);
        assert_eq!(store.count_failed(LogKind::Personal).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_submission_times_out() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let remote = Arc::new(InMemoryRemoteStore::with_latency(Duration::from_secs(60)));
        let engine = SyncEngine::new(
            store.clone(),
            remote,
            EngineConfig {
                submit_timeout: Duration::from_secs(1),
                retry_cooldown: Duration::ZERO,
            },
        );
        store.enqueue(&personal("p1")).await.unwrap();

        let result = engine.sync_all().await.unwrap().unwrap();

        assert_eq!(result.errors, vec!["timeout".to_string()]);
        let p1 = store.get(&rid("p1")).await.unwrap().unwrap();
        assert_eq!(p1.sync_status, SyncStatus::Failed);
        assert!(!p1.terminal);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_runs_are_single_flight() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let remote = Arc::new(InMemoryRemoteStore::with_latency(Duration::from_millis(200)));
        let engine = SyncEngine::new(store.clone(), remote.clone(), EngineConfig::default());
        store.enqueue(&personal("p1")).await.unwrap();
        store.enqueue(&personal("p2")).await.unwrap();

        let (first, second) = tokio::join!(engine.sync_all(), engine.sync_all());
        let outcomes = [first.unwrap(), second.unwrap()];

        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_some()).count(), 1);
        assert_eq!(remote.submission_count().await, 2);
        assert_eq!(engine.completed_runs(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interrupted_records_are_recovered_and_retried() {
        let (store, remote, engine) = setup(no_cooldown()).await;
        store.enqueue(&personal("p1")).await.unwrap();
        store.mark_syncing(&rid("p1")).await.unwrap();

        let result = engine.sync_all().await.unwrap().unwrap();

        assert_eq!(result.personal_synced, 1);
        assert_eq!(remote.row_count().await, 1);
        assert!(store.get(&rid("p1")).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn records_enqueued_during_a_run_wait_for_the_next() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let remote = Arc::new(InMemoryRemoteStore::with_latency(Duration::from_millis(100)));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            remote.clone(),
            EngineConfig::default(),
        ));
        store.enqueue(&personal("p1")).await.unwrap();

        let running = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.sync_all().await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.enqueue(&personal("p2")).await.unwrap();

        let result = running.await.unwrap().unwrap().unwrap();
        assert_eq!(result.personal_synced, 1);
        assert_eq!(store.count_pending(LogKind::Personal).await.unwrap(), 1);
    }
}
