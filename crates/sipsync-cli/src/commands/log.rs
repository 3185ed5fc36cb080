use std::path::Path;

use sipsync_core::models::EventLog;
use sipsync_core::{DrinkLog, DrinkRef, LogPayload, QueuedLogRecord};

use crate::cli::{LogArgs, LogCommands};
use crate::commands::common::{open_store, parse_consumed_at};
use crate::config_file::CliConfig;
use crate::error::CliError;

pub async fn run_log(
    command: LogCommands,
    config: &CliConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let payload = build_payload(command, config)?;

    let store = open_store(db_path).await?;
    let id = store.enqueue(&QueuedLogRecord::new(payload)).await?;

    println!("{id}");
    Ok(())
}

pub fn build_payload(command: LogCommands, config: &CliConfig) -> Result<LogPayload, CliError> {
    match command {
        LogCommands::Personal(args) => Ok(LogPayload::Personal(build_drink_log(args, config)?)),
        LogCommands::Event {
            log,
            event,
            approval_required,
        } => {
            let log = build_drink_log(log, config)?;
            Ok(LogPayload::Event(EventLog::new(log, event, approval_required)?))
        }
    }
}

fn build_drink_log(args: LogArgs, config: &CliConfig) -> Result<DrinkLog, CliError> {
    let user_id = config.resolve_user(args.user)?;
    let consumed_at = parse_consumed_at(args.at.as_deref())?;
    let drink = DrinkRef::new(args.drink, args.serving_ml, args.abv);

    Ok(DrinkLog::new(
        user_id,
        &drink,
        args.quantity,
        consumed_at,
        args.memo,
    )?)
}
