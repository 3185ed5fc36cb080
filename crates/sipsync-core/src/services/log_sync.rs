//! Facade wiring the queue, engine, status controller and scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::SyncSettings;
use crate::connectivity::ConnectivityMonitor;
use crate::models::{DrinkLog, EventLog, LogKind, LogPayload, QueuedLogRecord, RecordId};
use crate::remote::RemoteStore;
use crate::services::{LocalStore, QueueCounts};
use crate::sync::{
    AutoSyncScheduler, EngineConfig, SchedulerConfig, SchedulerHandle, SyncEngine, SyncResult,
    SyncStatusController, SyncStatusSnapshot,
};
use crate::Result;

/// Builder for [`LogSync`].
pub struct LogSyncBuilder {
    store: LocalStore,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    engine: EngineConfig,
    scheduler: SchedulerConfig,
    success_display: Duration,
}

impl LogSyncBuilder {
    #[must_use]
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = config;
        self
    }

    #[must_use]
    pub fn scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    #[must_use]
    pub fn success_display(mut self, display: Duration) -> Self {
        self.success_display = display;
        self
    }

    /// Take every tunable from `settings`.
    #[must_use]
    pub fn settings(self, settings: &SyncSettings) -> Self {
        self.engine_config(settings.engine_config())
            .scheduler_config(settings.scheduler_config())
            .success_display(settings.success_display())
    }

    pub fn build(self) -> LogSync {
        let engine = Arc::new(SyncEngine::new(self.store.clone(), self.remote, self.engine));
        let controller = Arc::new(SyncStatusController::new(
            engine,
            self.connectivity.current_state(),
            self.success_display,
        ));
        let scheduler = AutoSyncScheduler::new(
            Arc::clone(&controller),
            Arc::clone(&self.connectivity),
            self.scheduler,
        );

        LogSync {
            store: self.store,
            connectivity: self.connectivity,
            controller,
            scheduler,
        }
    }
}

/// Entry point for front ends: enqueue logs, read counts, trigger and observe sync.
pub struct LogSync {
    store: LocalStore,
    connectivity: Arc<dyn ConnectivityMonitor>,
    controller: Arc<SyncStatusController>,
    scheduler: AutoSyncScheduler,
}

impl LogSync {
    pub fn builder(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> LogSyncBuilder {
        LogSyncBuilder {
            store,
            remote,
            connectivity,
            engine: EngineConfig::default(),
            scheduler: SchedulerConfig::default(),
            success_display: Duration::from_secs(3),
        }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn controller(&self) -> &Arc<SyncStatusController> {
        &self.controller
    }

    /// Queue a personal log; it is durable once this returns.
    pub async fn enqueue_personal_log(&self, log: DrinkLog) -> Result<RecordId> {
        self.store
            .enqueue(&QueuedLogRecord::new(LogPayload::Personal(log)))
            .await
    }

    /// Queue an event log; it is durable once this returns.
    pub async fn enqueue_event_log(&self, log: EventLog) -> Result<RecordId> {
        self.store
            .enqueue(&QueuedLogRecord::new(LogPayload::Event(log)))
            .await
    }

    pub async fn pending_count(&self, kind: LogKind) -> Result<usize> {
        self.store.count_pending(kind).await
    }

    pub async fn failed_count(&self, kind: LogKind) -> Result<usize> {
        self.store.count_failed(kind).await
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        self.store.counts().await
    }

    pub async fn list_failed(&self, kind: LogKind) -> Result<Vec<QueuedLogRecord>> {
        self.store.list_failed(kind).await
    }

    /// Let a permanently failed record take part in the next run.
    pub async fn retry_record(&self, id: &RecordId) -> Result<()> {
        self.store.retry(id).await
    }

    pub async fn discard_record(&self, id: &RecordId) -> Result<()> {
        self.store.discard(id).await
    }

    /// Sync now; `None` when offline, already syncing, or aborted by a fault.
    pub async fn sync_now(&self) -> Option<SyncResult> {
        self.controller
            .set_connectivity(self.connectivity.current_state());
        self.controller.sync().await
    }

    pub fn status(&self) -> SyncStatusSnapshot {
        self.controller.snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatusSnapshot> {
        self.controller.subscribe()
    }

    /// Start background sync; repeated calls return the running loop's handle.
    pub fn start_auto_sync(&self) -> SchedulerHandle {
        self.scheduler.start()
    }

    pub fn stop_auto_sync(&self) {
        self.scheduler.stop();
    }

    pub fn is_auto_sync_running(&self) -> bool {
        self.scheduler.is_running()
    }
}
