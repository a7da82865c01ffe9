//! CLI error types.

use rulesync_core::ReconcileError;
use rulesync_grafana::GrafanaError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reconciliation failed before or during the run.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// The Grafana client could not be built.
    #[error(transparent)]
    Grafana(#[from] GrafanaError),

    /// The run finished but some group operations failed.
    #[error("{failed} group operation(s) failed")]
    Incomplete {
        /// Number of failed group operations.
        failed: usize,
    },

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
