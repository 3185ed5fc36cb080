use std::path::Path;

use crate::commands::common::{format_counts_lines, open_store};
use crate::error::CliError;

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let counts = store.counts().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        for line in format_counts_lines(&counts) {
            println!("{line}");
        }
    }

    Ok(())
}
