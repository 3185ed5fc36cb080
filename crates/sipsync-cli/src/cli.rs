use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use sipsync_core::LogKind;

#[derive(Parser)]
#[command(name = "sipsync")]
#[command(about = "Log drinks offline and sync them when the network allows")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the CLI config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a drink log
    #[command(subcommand)]
    Log(LogCommands),
    /// Show pending and failed counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List records that failed to sync
    Failed {
        /// Only show one queue
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync queued logs now
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Let a permanently failed record sync again
    Retry {
        /// Record ID or unique ID prefix
        id: String,
    },
    /// Drop a failed record
    Discard {
        /// Record ID or unique ID prefix
        id: String,
    },
    /// Keep syncing in the background until interrupted
    Watch,
    /// Manage CLI configuration
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum LogCommands {
    /// Log a private drink
    Personal(LogArgs),
    /// Log a drink shared in a group event
    Event {
        #[command(flatten)]
        log: LogArgs,
        /// Event ID
        #[arg(long, value_name = "ID")]
        event: String,
        /// Peers must approve the log before it counts
        #[arg(long)]
        approval_required: bool,
    },
}

#[derive(Args)]
pub struct LogArgs {
    /// Drink catalog ID
    #[arg(long, value_name = "ID")]
    pub drink: String,
    /// Serving volume in millilitres
    #[arg(long, value_name = "ML")]
    pub serving_ml: u32,
    /// Alcohol by volume, in percent
    #[arg(long, value_name = "PERCENT")]
    pub abv: f64,
    /// Number of servings
    #[arg(short, long, default_value = "1")]
    pub quantity: u32,
    /// Free-form note
    #[arg(long)]
    pub memo: Option<String>,
    /// User ID (defaults to the configured user)
    #[arg(long, value_name = "ID")]
    pub user: Option<String>,
    /// When the drink was consumed, RFC 3339 (defaults to now)
    #[arg(long, value_name = "TIME")]
    pub at: Option<String>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the config file
    Init {
        /// Default user ID for new logs
        #[arg(long, value_name = "ID")]
        user: Option<String>,
        /// Remote API base URL
        #[arg(long, value_name = "URL")]
        remote_url: Option<String>,
        /// Bearer token for the remote API
        #[arg(long, value_name = "TOKEN")]
        auth_token: Option<String>,
        /// Background sync interval in seconds
        #[arg(long, value_name = "SECS")]
        sync_interval_secs: Option<u64>,
    },
    /// Print the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Personal,
    Event,
}

impl From<KindArg> for LogKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Personal => Self::Personal,
            KindArg::Event => Self::Event,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
