//! Reconciliation of the local queue with the remote store.

mod engine;
mod scheduler;
mod status;

pub use engine::{EngineConfig, SyncEngine, SyncResult};
pub use scheduler::{AutoSyncScheduler, SchedulerConfig, SchedulerHandle};
pub use status::{SyncStatusController, SyncStatusSnapshot};
