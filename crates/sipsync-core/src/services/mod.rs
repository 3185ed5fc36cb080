//! Shared services used across clients.

mod local_store;
mod log_sync;

pub use local_store::{LocalStore, QueueCounts};
pub use log_sync::{LogSync, LogSyncBuilder};
