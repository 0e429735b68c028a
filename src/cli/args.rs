use clap::{Args, Parser, Subcommand};

use crate::utils::WindowSpec;

#[derive(Parser)]
#[command(name = "smscost")]
#[command(about = "SMS segment and cost accounting")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Override currency (EUR, GBP, JPY, etc.)
    #[arg(long, global = true)]
    pub currency: Option<String>,

    /// Override timezone
    #[arg(long, global = true)]
    pub timezone: Option<String>,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON output format
    #[arg(long, global = true)]
    pub json: bool,

    /// Rounded table borders
    #[arg(long, global = true)]
    pub colored: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Date window flags shared by commands that read conversations
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Only conversations started today
    #[arg(long, conflicts_with_all = ["yesterday", "days", "since", "until"])]
    pub today: bool,

    /// Only conversations started yesterday
    #[arg(long, conflicts_with_all = ["days", "since", "until"])]
    pub yesterday: bool,

    /// Only conversations from the last N days, today included
    #[arg(long, conflicts_with_all = ["since", "until"])]
    pub days: Option<u32>,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,

    /// End date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<String>,
}

impl WindowArgs {
    pub fn spec(&self) -> WindowSpec {
        if self.today {
            WindowSpec::Today
        } else if self.yesterday {
            WindowSpec::Yesterday
        } else if let Some(days) = self.days {
            WindowSpec::LastDays(days)
        } else if self.since.is_some() || self.until.is_some() {
            WindowSpec::Range {
                since: self.since.clone(),
                until: self.until.clone(),
            }
        } else {
            WindowSpec::All
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize fresh configuration
    Init,
    /// Set configuration value
    Set {
        /// Configuration key (e.g., currency.default_currency)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// Show cached entry counts per tier
    Stats,
    /// Remove every cached segment count
    Clear,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show segment and cost totals for a conversation export
    Snapshot {
        /// JSON file holding an array of conversations
        file: String,

        #[command(flatten)]
        window: WindowArgs,

        /// Only use cached counts and local estimates
        #[arg(long)]
        no_reconcile: bool,

        /// Print a fresh snapshot whenever reconciliation updates the cache
        #[arg(long, conflicts_with = "no_reconcile")]
        watch: bool,
    },

    /// Fetch full conversations and store authoritative segment counts
    Reconcile {
        /// JSON file holding an array of conversations
        file: String,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Discard quick estimates and show the recomputed snapshot
    Invalidate {
        /// JSON file holding an array of conversations
        file: String,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Segment cache management
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}
