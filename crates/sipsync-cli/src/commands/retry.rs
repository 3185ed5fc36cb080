use std::path::Path;

use crate::commands::common::{open_store, resolve_record_id};
use crate::error::CliError;

pub async fn run_retry(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let id = resolve_record_id(id, &store).await?;

    store.retry(&id).await?;
    println!("{id}");
    Ok(())
}
