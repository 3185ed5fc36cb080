pub mod common;
pub mod completions;
pub mod config;
pub mod discard;
pub mod failed;
pub mod log;
pub mod retry;
pub mod status;
pub mod sync;
pub mod watch;
