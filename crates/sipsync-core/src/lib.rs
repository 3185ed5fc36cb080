//! sipsync-core - Core library for sipsync
//!
//! This crate contains the drink log models, the durable local queue, and the
//! reconciliation machinery (engine, scheduler, status controller) used by all
//! sipsync front ends.

pub mod claims;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod util;

pub use error::{Error, Result};
pub use models::{DrinkLog, DrinkRef, LogKind, LogPayload, QueuedLogRecord, RecordId, SyncStatus};
pub use state::SyncState;
pub use sync::{SyncResult, SyncStatusSnapshot};
