//! Network connectivity capability.
//!
//! The engine never probes the network itself; it consumes a
//! [`ConnectivityMonitor`] supplied by the host. Two implementations ship
//! here: [`ManualConnectivity`] for hosts that already know the OS network
//! state (and for tests), and [`ProbeConnectivity`] which polls the remote
//! health endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

/// Snapshot of the device's network state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectivityState {
    pub is_connected: bool,
    /// `None` when the platform has not determined reachability yet
    pub is_internet_reachable: Option<bool>,
}

impl ConnectivityState {
    pub const fn online() -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
        }
    }

    pub const fn offline() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Some(false),
        }
    }

    /// Connected, and reachability is not known to be false.
    pub const fn is_online(&self) -> bool {
        self.is_connected && !matches!(self.is_internet_reachable, Some(false))
    }
}

/// Source of connectivity state and change notifications.
///
/// Dropping the receiver returned by `subscribe` unsubscribes.
pub trait ConnectivityMonitor: Send + Sync {
    fn current_state(&self) -> ConnectivityState;

    fn subscribe(&self) -> watch::Receiver<ConnectivityState>;
}

/// Connectivity pushed in by the host.
#[derive(Debug)]
pub struct ManualConnectivity {
    tx: watch::Sender<ConnectivityState>,
}

impl ManualConnectivity {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a new state; repeats of the current state are not broadcast.
    pub fn set(&self, state: ConnectivityState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    pub fn set_online(&self, online: bool) {
        self.set(if online {
            ConnectivityState::online()
        } else {
            ConnectivityState::offline()
        });
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn current_state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

/// Connectivity derived from polling `GET {base_url}/health`.
pub struct ProbeConnectivity {
    tx: watch::Sender<ConnectivityState>,
    health_url: String,
    interval: Duration,
    client: reqwest::Client,
}

impl ProbeConnectivity {
    /// The monitor starts with unknown reachability until the first probe.
    pub fn new(base_url: &str, interval: Duration, timeout: Duration) -> Result<Self> {
        let base_url = normalize_text_option(Some(base_url.to_string()))
            .filter(|url| is_http_url(url))
            .ok_or_else(|| {
                Error::InvalidInput("probe URL must include http:// or https://".into())
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::InvalidInput(format!("failed to build HTTP client: {error}")))?;

        let (tx, _rx) = watch::channel(ConnectivityState {
            is_connected: true,
            is_internet_reachable: None,
        });

        Ok(Self {
            tx,
            health_url: format!("{}/health", base_url.trim_end_matches('/')),
            interval,
            client,
        })
    }

    /// Probe once and publish the outcome.
    pub async fn probe_once(&self) -> ConnectivityState {
        let state = match self.client.get(&self.health_url).send().await {
            Ok(response) if response.status().is_success() => ConnectivityState::online(),
            Ok(response) => {
                tracing::debug!(
                    "Health probe answered {}; treating remote as unreachable",
                    response.status()
                );
                ConnectivityState {
                    is_connected: true,
                    is_internet_reachable: Some(false),
                }
            }
            Err(error) => {
                tracing::debug!("Health probe failed: {error}");
                ConnectivityState::offline()
            }
        };

        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                tracing::info!(
                    "Connectivity changed: {}",
                    if state.is_online() { "online" } else { "offline" }
                );
                *current = state;
                true
            }
        });
        state
    }

    /// Keep probing in the background until the returned task is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.probe_once().await;
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}

impl ConnectivityMonitor for ProbeConnectivity {
    fn current_state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_reachability_counts_as_online() {
        let state = ConnectivityState {
            is_connected: true,
            is_internet_reachable: None,
        };
        assert!(state.is_online());
        assert!(!ConnectivityState::offline().is_online());
        assert!(!ConnectivityState {
            is_connected: true,
            is_internet_reachable: Some(false),
        }
        .is_online());
    }

    #[tokio::test]
    async fn manual_connectivity_broadcasts_changes_only() {
        let monitor = ManualConnectivity::new(ConnectivityState::online());
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_online());
        assert!(!monitor.current_state().is_online());
    }

    #[tokio::test]
    async fn unreachable_probe_reports_offline() {
        // Nothing listens on port 9 of the loopback interface.
        let probe = ProbeConnectivity::new(
            "http://127.0.0.1:9",
            Duration::from_secs(60),
            Duration::from_millis(500),
        )
        .unwrap();

        assert!(probe.current_state().is_online());
        let state = probe.probe_once().await;
        assert!(!state.is_online());
        assert_eq!(probe.current_state(), state);
    }

    #[test]
    fn probe_rejects_non_http_url() {
        assert!(ProbeConnectivity::new("localhost", Duration::from_secs(1), Duration::from_secs(1))
            .is_err());
    }
}
