//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rulesync_core::config::{DEFAULT_DATASOURCE, DEFAULT_FOLDER};

/// Reconcile Grafana alert rules against a desired-state table.
#[derive(Parser, Debug, Clone)]
#[command(name = "rulesync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Grafana server address, e.g. `https://example.com/grafana`.
    #[arg(short, long, env = "RULESYNC_SERVER")]
    pub server: String,

    /// Grafana user name.
    #[arg(short, long, env = "RULESYNC_USERNAME", default_value = "admin")]
    pub username: String,

    /// Grafana password.
    #[arg(short, long, env = "RULESYNC_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Skip TLS certificate verification.
    #[arg(long)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Log format written to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Log output options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Converge the managed folder onto the desired-state table.
    Sync(RuleArgs),

    /// Show what `sync` would change without writing anything.
    Plan(RuleArgs),

    /// Replace the managed notification receivers.
    ContactPoints(ContactPointArgs),

    /// Route generated alerts to the managed receivers.
    NotificationPolicies(NotificationPolicyArgs),
}

/// Arguments shared by `sync` and `plan`.
#[derive(Args, Debug, Clone)]
pub struct RuleArgs {
    /// Desired-state CSV table.
    #[arg(long = "file", value_name = "CSV")]
    pub file: PathBuf,

    /// Title of the folder holding the managed rule groups.
    #[arg(long, env = "RULESYNC_FOLDER", default_value = DEFAULT_FOLDER)]
    pub folder: String,

    /// Name of the datasource the rules query.
    #[arg(long, env = "RULESYNC_DATASOURCE", default_value = DEFAULT_DATASOURCE)]
    pub datasource: String,

    /// Evaluation interval of each group.
    #[arg(long, default_value = "1m")]
    pub interval: String,

    /// How long a condition must hold before a rule fires.
    #[arg(long, default_value = "0s")]
    pub pending_for: String,
}

/// Arguments of `contact-points`.
#[derive(Args, Debug, Clone)]
pub struct ContactPointArgs {
    /// Contact-point CSV file; template files resolve next to it.
    #[arg(long = "file", value_name = "CSV")]
    pub file: PathBuf,
}

/// Arguments of `notification-policies`.
#[derive(Args, Debug, Clone)]
pub struct NotificationPolicyArgs {
    /// JSON document listing each service and its notification channels.
    #[arg(long = "file", value_name = "JSON")]
    pub file: PathBuf,

    /// Drop routes added outside this tool instead of keeping them.
    #[arg(long)]
    pub skip_merge_existing_policies: bool,
}
