use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sipsync_core::config::SyncSettings;
use sipsync_core::connectivity::ConnectivityMonitor;
use sipsync_core::remote::HttpRemoteStore;
use sipsync_core::services::{LocalStore, LogSync, QueueCounts};
use sipsync_core::{LogKind, QueuedLogRecord, RecordId, SyncResult};

use crate::config_file::{default_config_path, CliConfig};
use crate::error::CliError;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct FailedRecordItem {
    pub id: String,
    pub kind: LogKind,
    pub drink_id: String,
    pub quantity: u32,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub terminal: bool,
    pub created_at: i64,
    pub created_at_iso: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("SIPSYNC_DB_PATH").map(PathBuf::from))
    {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    Ok(dirs::data_dir()
        .ok_or(CliError::MissingPlatformDir("data"))?
        .join("sipsync")
        .join("sipsync.db"))
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    cli_config_path.map_or_else(default_config_path, Ok)
}

pub fn load_config(path: &Path) -> Result<CliConfig, CliError> {
    CliConfig::load_from_path(path)
}

pub async fn open_store(db_path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(db_path).await?)
}

/// Wire the facade against the configured HTTP remote.
pub fn build_log_sync(
    store: LocalStore,
    settings: &SyncSettings,
    connectivity: Arc<dyn ConnectivityMonitor>,
) -> Result<LogSync, CliError> {
    let base_url = settings
        .remote_base_url()
        .ok_or(CliError::RemoteNotConfigured)?;
    let remote = HttpRemoteStore::new(
        base_url,
        settings.auth_token.clone(),
        settings.submit_timeout(),
    )?;

    Ok(LogSync::builder(store, Arc::new(remote), connectivity)
        .settings(settings)
        .build())
}

pub fn parse_record_id(id: &str) -> Result<RecordId, CliError> {
    id.parse::<RecordId>().map_err(|_| CliError::EmptyRecordId)
}

/// Resolve a full record ID or a unique prefix of one.
pub async fn resolve_record_id(query: &str, store: &LocalStore) -> Result<RecordId, CliError> {
    let record_id = parse_record_id(query)?;
    if store.get(&record_id).await?.is_some() {
        return Ok(record_id);
    }

    let matching_ids = store.list_ids_by_prefix(record_id.as_str(), 3).await?;

    match matching_ids.len() {
        0 => Err(CliError::RecordNotFound(query.trim().to_string())),
        1 => parse_record_id(&matching_ids[0]),
        _ => Err(CliError::AmbiguousRecordId(format!(
            "ID prefix '{}' is ambiguous; matches: {}",
            query.trim(),
            matching_ids.join(", ")
        ))),
    }
}

/// Parse an RFC 3339 timestamp into Unix milliseconds; `None` means now.
pub fn parse_consumed_at(value: Option<&str>) -> Result<i64, CliError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(Utc::now().timestamp_millis());
    };

    DateTime::parse_from_rfc3339(value)
        .map(|date_time| date_time.timestamp_millis())
        .map_err(|_| CliError::InvalidTimestamp(value.to_string()))
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn failed_to_item(record: &QueuedLogRecord) -> FailedRecordItem {
    let log = record.payload.drink_log();
    FailedRecordItem {
        id: record.id.to_string(),
        kind: record.kind,
        drink_id: log.drink_id.clone(),
        quantity: log.quantity,
        attempt_count: record.attempt_count,
        last_error: record.last_error.clone(),
        terminal: record.terminal,
        created_at: record.created_at,
        created_at_iso: format_timestamp(record.created_at),
    }
}

pub fn format_failed_lines(records: &[QueuedLogRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let marker = if record.terminal { "needs action" } else { "will retry" };
            let error = record.last_error.as_deref().unwrap_or("-");
            format!(
                "{:<36}  {:<8}  attempts={:<3}  {marker:<12}  {error}",
                record.id.as_str(),
                record.kind.as_str(),
                record.attempt_count
            )
        })
        .collect()
}

pub fn format_counts_lines(counts: &QueueCounts) -> Vec<String> {
    LogKind::ALL
        .iter()
        .map(|kind| {
            format!(
                "{:<8}  pending={:<4}  failed={}",
                kind.as_str(),
                counts.pending(*kind),
                counts.failed(*kind)
            )
        })
        .collect()
}

pub fn format_sync_result(result: &SyncResult) -> Vec<String> {
    let mut lines = vec![format!(
        "Synced {} personal and {} event log(s); {} personal and {} event failed",
        result.personal_synced, result.event_synced, result.personal_failed, result.event_failed
    )];
    lines.extend(result.errors.iter().map(|error| format!("  - {error}")));
    lines
}
