//! Data models for sipsync

mod log;
mod record;

pub use log::{pure_alcohol_grams, DrinkLog, DrinkRef, EventLog, LogPayload};
pub use record::{LogKind, QueuedLogRecord, RecordId, SyncStatus};
