//! Error types for the rulesync-core crate.

use thiserror::Error;

/// Errors that can occur while reconciling alert rules.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The desired-state input or the engine configuration is invalid.
    #[error("configuration error: {reason}")]
    Configuration {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// A rule template could not be rendered.
    #[error("template error: {reason}")]
    Template {
        /// The reason rendering failed.
        reason: String,
    },

    /// The remote service rejected a request or returned an unusable payload.
    #[error("remote state error during {operation}: {reason}")]
    RemoteState {
        /// The remote operation that failed.
        operation: String,
        /// The reason the operation failed.
        reason: String,
    },

    /// The remote service could not be reached.
    #[error("transport error during {operation}: {reason}")]
    Transport {
        /// The remote operation that failed.
        operation: String,
        /// The underlying connection or timeout error.
        reason: String,
    },

    /// Reading an input file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The desired-state table could not be parsed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ReconcileError {
    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Creates a template error.
    pub fn template(reason: impl Into<String>) -> Self {
        Self::Template {
            reason: reason.into(),
        }
    }

    /// Creates a remote state error for the named operation.
    pub fn remote(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RemoteState {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Creates a transport error for the named operation.
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors raised before any remote call is made.
    ///
    /// These abort the run before a single mutation is issued.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::Template { .. } | Self::Io(_) | Self::Csv(_)
        )
    }

    /// Returns true if the remote service could not be reached at all.
    ///
    /// A transport failure during apply stops the remaining queue.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<serde_json::Error> for ReconcileError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
