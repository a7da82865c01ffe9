//! Contact-points command implementation.

use std::io::Write;

use rulesync_core::{RuleStore, load_contact_points, sync_contact_points};
use tracing::info;

use crate::cli::ContactPointArgs;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Replaces the managed receivers of the remote alertmanager.
pub struct ContactPointsCommand<'a, S> {
    store: &'a S,
}

impl<'a, S: RuleStore> ContactPointsCommand<'a, S> {
    /// Create a new contact-points command.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Execute the contact-points command.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or a template is unreadable, or the
    /// alertmanager configuration cannot be read or written.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &ContactPointArgs,
    ) -> Result<(), CliError> {
        let points = load_contact_points(&args.file)?;
        info!(points = points.len(), file = %args.file.display(), "loaded contact points");

        let report = sync_contact_points(self.store, &points).await?;
        format.write(out, &report)
    }
}
