//! Database layer for sipsync

mod claims_repository;
mod connection;
mod migrations;
mod queue_repository;

pub use claims_repository::{ClaimsRepository, LibSqlClaimsRepository};
pub use connection::Database;
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
