//! Error types for the rulesync-grafana crate.

use rulesync_core::ReconcileError;
use thiserror::Error;

/// Errors raised while setting up a Grafana connection.
#[derive(Debug, Error)]
pub enum GrafanaError {
    /// The server address could not be used as a base URL.
    #[error("invalid server address '{address}': {reason}")]
    InvalidAddress {
        /// The address as given.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

impl From<GrafanaError> for ReconcileError {
    fn from(err: GrafanaError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Result type for Grafana setup.
pub type Result<T> = std::result::Result<T, GrafanaError>;
