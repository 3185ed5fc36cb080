//! Interval and reconnect triggers for the status controller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::connectivity::ConnectivityMonitor;
use crate::sync::SyncStatusController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Period of the background sync while online
    pub interval: Duration,
    /// How long connectivity must stay up before a reconnect sync fires
    pub reconnect_debounce: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            reconnect_debounce: Duration::from_millis(750),
        }
    }
}

/// Stops the scheduler loop it was returned from.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Cancel the interval and drop the connectivity subscription.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Whether both handles control the same loop.
    pub fn same_loop(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shutdown, &other.shutdown)
    }
}

/// Drives `SyncStatusController::sync` from a timer, reconnect edges and
/// startup. At most one loop runs per scheduler.
pub struct AutoSyncScheduler {
    controller: Arc<SyncStatusController>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    config: SchedulerConfig,
    running: Mutex<Option<SchedulerHandle>>,
}

impl AutoSyncScheduler {
    pub fn new(
        controller: Arc<SyncStatusController>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            controller,
            connectivity,
            config,
            running: Mutex::new(None),
        }
    }

    /// Start the loop, or return the handle of the one already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> SchedulerHandle {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = running.as_ref().filter(|handle| !handle.is_stopped()) {
            tracing::debug!("Auto-sync already running");
            return handle.clone();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = SchedulerHandle {
            shutdown: Arc::new(shutdown_tx),
        };
        tokio::spawn(run_loop(
            Arc::clone(&self.controller),
            Arc::clone(&self.connectivity),
            self.config,
            shutdown_rx,
        ));

        *running = Some(handle.clone());
        handle
    }

    pub fn stop(&self) {
        if let Some(handle) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_stopped())
    }
}

async fn run_loop(
    controller: Arc<SyncStatusController>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    config: SchedulerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut updates = connectivity.subscribe();
    let initial = *updates.borrow_and_update();
    controller.set_connectivity(initial);
    let mut online = initial.is_online();
    let mut listening = true;
    let mut reconnect_at: Option<Instant> = None;

    tracing::info!(
        "Auto-sync started (every {}s, {}ms reconnect debounce)",
        config.interval.as_secs(),
        config.reconnect_debounce.as_millis()
    );

    if online {
        spawn_sync(&controller, "startup");
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if online {
                    spawn_sync(&controller, "interval");
                }
            }
            changed = updates.changed(), if listening => {
                if changed.is_err() {
                    tracing::warn!("Connectivity monitor went away; reconnect trigger disabled");
                    listening = false;
                    continue;
                }

                let state = *updates.borrow_and_update();
                controller.set_connectivity(state);
                let now_online = state.is_online();
                if now_online && !online {
                    reconnect_at = Some(Instant::now() + config.reconnect_debounce);
                } else if !now_online {
                    reconnect_at = None;
                }
                online = now_online;
            }
            () = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                reconnect_at = None;
                if online {
                    spawn_sync(&controller, "reconnect");
                }
            }
        }
    }

    tracing::info!("Auto-sync stopped");
}

fn spawn_sync(controller: &Arc<SyncStatusController>, trigger: &'static str) {
    let controller = Arc::clone(controller);
    tokio::spawn(async move {
        tracing::debug!("Sync triggered by {trigger}");
        if controller.sync().await.is_none() {
            tracing::debug!("Sync from {trigger} skipped");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ConnectivityState, ManualConnectivity};
    use crate::services::LocalStore;
    use crate::state::SyncState;
    use crate::sync::{EngineConfig, SyncEngine};
    use crate::testing::InMemoryRemoteStore;

    struct Harness {
        engine: Arc<SyncEngine>,
        controller: Arc<SyncStatusController>,
        connectivity: Arc<ManualConnectivity>,
        scheduler: AutoSyncScheduler,
    }

    async fn harness(online: bool, interval: Duration) -> Harness {
        let store = LocalStore::open_in_memory().await.unwrap();
        let engine = Arc::new(SyncEngine::new(
            store,
            Arc::new(InMemoryRemoteStore::new()),
            EngineConfig::default(),
        ));
        let connectivity = Arc::new(ManualConnectivity::new(if online {
            ConnectivityState::online()
        } else {
            ConnectivityState::offline()
        }));
        let controller = Arc::new(SyncStatusController::new(
            Arc::clone(&engine),
            connectivity.current_state(),
            Duration::from_secs(3),
        ));
        let scheduler = AutoSyncScheduler::new(
            Arc::clone(&controller),
            connectivity.clone(),
            SchedulerConfig {
                interval,
                reconnect_debounce: Duration::from_millis(750),
            },
        );
        Harness {
            engine,
            controller,
            connectivity,
            scheduler,
        }
    }

    /// Let spawned tasks and paused timers make progress.
    async fn settle(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    #[tokio::test(start_paused = true)]
    async fn syncs_on_start_and_on_interval() {
        let h = harness(true, Duration::from_secs(10)).await;
        let handle = h.scheduler.start();

        settle(Duration::from_millis(100)).await;
        assert_eq!(h.engine.completed_runs(), 1);

        settle(Duration::from_secs(35)).await;
        assert_eq!(h.engine.completed_runs(), 4);

        handle.stop();
        settle(Duration::from_secs(60)).await;
        assert_eq!(h.engine.completed_runs(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_reentrant() {
        let h = harness(true, Duration::from_secs(10)).await;
        let first = h.scheduler.start();
        let second = h.scheduler.start();
        assert!(first.same_loop(&second));

        settle(Duration::from_secs(15)).await;
        assert_eq!(h.engine.completed_runs(), 2);

        h.scheduler.stop();
        assert!(first.is_stopped());
        assert!(!h.scheduler.is_running());

        let third = h.scheduler.start();
        assert!(!third.same_loop(&first));
        third.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_connectivity_triggers_one_sync() {
        let h = harness(true, Duration::from_secs(3600)).await;
        let handle = h.scheduler.start();
        settle(Duration::from_millis(100)).await;
        assert_eq!(h.engine.completed_runs(), 1);

        for online in [false, true, false, true] {
            h.connectivity.set_online(online);
            settle(Duration::from_millis(50)).await;
        }
        assert_eq!(h.engine.completed_runs(), 1);

        settle(Duration::from_secs(2)).await;
        assert_eq!(h.engine.completed_runs(), 2);

        settle(Duration::from_secs(30)).await;
        assert_eq!(h.engine.completed_runs(), 2);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn offline_start_waits_for_connectivity() {
        let h = harness(false, Duration::from_secs(10)).await;
        let handle = h.scheduler.start();

        settle(Duration::from_secs(25)).await;
        assert_eq!(h.engine.completed_runs(), 0);
        assert_eq!(h.controller.state(), SyncState::Offline);

        h.connectivity.set_online(true);
        settle(Duration::from_millis(100)).await;
        assert_eq!(h.controller.state(), SyncState::Idle);

        settle(Duration::from_secs(1)).await;
        assert_eq!(h.engine.completed_runs(), 1);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn losing_connectivity_cancels_pending_reconnect() {
        let h = harness(false, Duration::from_secs(3600)).await;
        let handle = h.scheduler.start();
        settle(Duration::from_millis(100)).await;

        h.connectivity.set_online(true);
        settle(Duration::from_millis(300)).await;
        h.connectivity.set_online(false);
        settle(Duration::from_secs(5)).await;

        assert_eq!(h.engine.completed_runs(), 0);
        assert_eq!(h.controller.state(), SyncState::Offline);
        handle.stop();
    }
}
