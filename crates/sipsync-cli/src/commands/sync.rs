use std::path::Path;
use std::sync::Arc;

use sipsync_core::connectivity::ProbeConnectivity;
use sipsync_core::SyncState;

use crate::commands::common::{build_log_sync, format_sync_result, open_store, PROBE_TIMEOUT};
use crate::config_file::CliConfig;
use crate::error::CliError;

pub async fn run_sync(as_json: bool, config: &CliConfig, db_path: &Path) -> Result<(), CliError> {
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

    let store = open_store(db_path).await?;
    let log_sync = build_log_sync(store, &settings, probe)?;
    let result = log_sync.sync_now().await;
    let status = log_sync.status();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if let Some(result) = result {
        for line in format_sync_result(&result) {
            println!("{line}");
        }
        return Ok(());
    }

    match status.state {
        SyncState::Offline => println!("Skipped: remote store at {base_url} is unreachable"),
        SyncState::Error => println!(
            "Sync failed: {}",
            status.last_error.as_deref().unwrap_or("unknown error")
        ),
        _ => println!("Skipped: another sync is already running"),
    }
    Ok(())
}
