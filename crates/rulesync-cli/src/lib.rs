//! # rulesync-cli
//!
//! Command-line front end for the alert-rule reconciliation engine.
//!
//! Provides commands for:
//! - `sync`: converge the managed Grafana folder onto a CSV table
//! - `plan`: print what `sync` would change
//! - `contact-points`: replace the managed notification receivers
//!
//! ```text
//! ┌──────────┐   rows    ┌───────────────┐   HTTP   ┌──────────┐
//! │ CSV file │──────────►│ rulesync-core │◄────────►│ Grafana  │
//! └──────────┘           └───────────────┘          └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, ContactPointArgs, Format, LogFormat, RuleArgs};
pub use error::CliError;
pub use output::OutputFormat;

use std::time::Duration;

use rulesync_grafana::{GrafanaClient, GrafanaConfig};

/// Builds the Grafana client described by the global flags.
///
/// # Errors
///
/// Returns an error if the server address is invalid or the HTTP client
/// cannot be constructed.
pub fn connect(cli: &Cli) -> Result<GrafanaClient, CliError> {
    let config = GrafanaConfig::new(&cli.server)?
        .with_credentials(cli.username.clone(), cli.password.clone())
        .with_verify_tls(!cli.insecure)
        .with_timeout(Duration::from_secs(cli.timeout_secs));
    Ok(GrafanaClient::new(config)?)
}
