//! Plan command implementation.

use std::io::Write;

use rulesync_core::{Reconciler, RuleStore, load_rows};
use tracing::info;

use crate::cli::RuleArgs;
use crate::commands::reconcile_config;
use crate::error::CliError;
use crate::output::{OutputFormat, PlanSummary};

/// Reads the remote state and prints the diff without mutating anything.
pub struct PlanCommand<'a, S> {
    store: &'a S,
}

impl<'a, S: RuleStore> PlanCommand<'a, S> {
    /// Create a new plan command.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Execute the plan command.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is invalid or the remote state cannot be read.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &RuleArgs,
    ) -> Result<(), CliError> {
        let reconciler = Reconciler::new(self.store, reconcile_config(args))?;
        let rows = load_rows(&args.file)?;
        info!(rows = rows.len(), file = %args.file.display(), "loaded desired state");

        let plan = reconciler.plan(&rows).await?;
        let summary = PlanSummary::from_plan(&args.folder, &plan);
        format.write(out, &summary)
    }
}
