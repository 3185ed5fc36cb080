//! Observable sync status state machine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::connectivity::ConnectivityState;
use crate::state::SyncState;
use crate::sync::{SyncEngine, SyncResult};
use crate::util::unix_millis_now;

/// What subscribers see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatusSnapshot {
    pub state: SyncState,
    /// Unix ms of the last run that completed without an engine fault
    pub last_sync_at: Option<i64>,
    pub last_result: Option<SyncResult>,
    /// Last engine fault, cleared by the next successful run
    pub last_error: Option<String>,
    pub online: bool,
}

impl SyncStatusSnapshot {
    fn initial(online: bool) -> Self {
        Self {
            state: if online {
                SyncState::Idle
            } else {
                SyncState::Offline
            },
            last_sync_at: None,
            last_result: None,
            last_error: None,
            online,
        }
    }

    /// State to settle in once a run is over.
    const fn resting(&self, after_run: SyncState) -> SyncState {
        if self.online {
            after_run
        } else {
            SyncState::Offline
        }
    }
}

/// Wraps the engine with the `idle | syncing | success | error | offline`
/// machine the UI renders.
pub struct SyncStatusController {
    engine: Arc<SyncEngine>,
    status: Arc<watch::Sender<SyncStatusSnapshot>>,
    success_display: Duration,
    /// Bumped on every run so a stale auto-clear cannot reset a newer success
    generation: Arc<AtomicU64>,
}

impl SyncStatusController {
    pub fn new(
        engine: Arc<SyncEngine>,
        connectivity: ConnectivityState,
        success_display: Duration,
    ) -> Self {
        let (status, _rx) = watch::channel(SyncStatusSnapshot::initial(connectivity.is_online()));
        Self {
            engine,
            status: Arc::new(status),
            success_display,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub const fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn snapshot(&self) -> SyncStatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> SyncState {
        self.status.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatusSnapshot> {
        self.status.subscribe()
    }

    /// Run the engine unless offline or already syncing.
    ///
    /// Returns `None` when the run was skipped or aborted by an engine fault;
    /// the fault itself is published in the snapshot.
    pub async fn sync(&self) -> Option<SyncResult> {
        let mut started = false;
        self.status.send_if_modified(|status| match status.state {
            SyncState::Offline | SyncState::Syncing => false,
            SyncState::Idle | SyncState::Success | SyncState::Error => {
                status.state = SyncState::Syncing;
                started = true;
                true
            }
        });
        if !started {
            tracing::debug!("Sync not started: status is {}", self.state());
            return None;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        match self.engine.sync_all().await {
            Ok(Some(result)) => {
                let finished_at = unix_millis_now();
                let mut show_success = false;
                self.status.send_modify(|status| {
                    status.state = status.resting(SyncState::Success);
                    status.last_sync_at = Some(finished_at);
                    status.last_result = Some(result.clone());
                    status.last_error = None;
                    show_success = status.state == SyncState::Success;
                });
                if show_success {
                    self.schedule_success_clear(generation);
                }
                Some(result)
            }
            Ok(None) => {
                // The engine was claimed by a caller that bypasses this controller.
                self.status
                    .send_modify(|status| status.state = status.resting(SyncState::Idle));
                None
            }
            Err(error) => {
                tracing::error!("Sync run aborted: {error}");
                self.status.send_modify(|status| {
                    status.state = status.resting(SyncState::Error);
                    status.last_error = Some(error.to_string());
                });
                None
            }
        }
    }

    /// Apply a connectivity change; returns true on an offline to online edge.
    pub fn set_connectivity(&self, connectivity: ConnectivityState) -> bool {
        let online = connectivity.is_online();
        let mut restored = false;
        self.status.send_if_modified(|status| {
            if status.online == online {
                return false;
            }
            status.online = online;
            if online {
                restored = true;
                if status.state == SyncState::Offline {
                    status.state = SyncState::Idle;
                }
            } else if status.state != SyncState::Syncing {
                status.state = SyncState::Offline;
            }
            true
        });

        if restored {
            tracing::info!("Connectivity restored");
        } else if !online {
            tracing::info!("Connectivity lost");
        }
        restored
    }

    fn schedule_success_clear(&self, generation: u64) {
        let status = Arc::clone(&self.status);
        let current = Arc::clone(&self.generation);
        let display = self.success_display;
        tokio::spawn(async move {
            tokio::time::sleep(display).await;
            status.send_if_modified(|status| {
                if status.state == SyncState::Success
                    && current.load(Ordering::SeqCst) == generation
                {
                    status.state = SyncState::Idle;
                    true
                } else {
                    false
                }
            });
        });
    }
}
