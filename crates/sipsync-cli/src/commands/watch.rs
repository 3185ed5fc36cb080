use std::path::Path;
use std::sync::Arc;

use sipsync_core::connectivity::ProbeConnectivity;

use crate::commands::common::{build_log_sync, format_sync_result, open_store, PROBE_TIMEOUT};
use crate::config_file::CliConfig;
use crate::error::CliError;

pub async fn run_watch(config: &CliConfig, db_path: &Path) -> Result<(), CliError> {
    let settings = config.effective_settings()?;
    let base_url = settings
        .remote_base_url()
        .ok_or(CliError::RemoteNotConfigured)?;

    let probe = Arc::new(ProbeConnectivity::new(
        &base_url,
        settings.probe_interval(),
        PROBE_TIMEOUT,
    )?);
    probe.probe_once().await;
    let probe_task = Arc::clone(&probe).spawn();

    let store = open_store(db_path).await?;
    let log_sync = build_log_sync(store, &settings, probe)?;
    let mut status = log_sync.subscribe_status();
    log_sync.start_auto_sync();
    println!("Watching {base_url}; press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                println!("status: {}", snapshot.state);
                if let (sipsync_core::SyncState::Success, Some(result)) =
                    (snapshot.state, snapshot.last_result.as_ref())
                {
                    for line in format_sync_result(result) {
                        println!("  {line}");
                    }
                }
                if let Some(error) = snapshot.last_error.as_deref() {
                    tracing::warn!("Last sync error: {error}");
                }
            }
        }
    }

    log_sync.stop_auto_sync();
    probe_task.abort();
    let counts = log_sync.counts().await?;
    println!(
        "Stopped with {} pending and {} failed log(s)",
        counts.personal_pending + counts.event_pending,
        counts.personal_failed + counts.event_failed
    );
    Ok(())
}
