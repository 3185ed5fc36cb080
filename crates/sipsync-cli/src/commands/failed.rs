use std::path::Path;

use sipsync_core::LogKind;

use crate::commands::common::{failed_to_item, format_failed_lines, open_store, FailedRecordItem};
use crate::error::CliError;

pub async fn run_failed(
    kind: Option<LogKind>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;

    let mut records = Vec::new();
    for kind in kind.map_or_else(|| LogKind::ALL.to_vec(), |kind| vec![kind]) {
        records.extend(store.list_failed(kind).await?);
    }

    if as_json {
        let json_items = records
            .iter()
            .map(failed_to_item)
            .collect::<Vec<FailedRecordItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No failed records.");
        return Ok(());
    }

    for line in format_failed_lines(&records) {
        println!("{line}");
    }
    Ok(())
}
