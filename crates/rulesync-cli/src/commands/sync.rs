//! Sync command implementation.

use std::io::Write;

use rulesync_core::{Reconciler, RuleStore, load_rows};
use tracing::{info, warn};

use crate::cli::RuleArgs;
use crate::commands::reconcile_config;
use crate::error::CliError;
use crate::output::{OutputFormat, PlanSummary, SyncSummary};

/// Converges the managed folder onto the desired-state table.
pub struct SyncCommand<'a, S> {
    store: &'a S,
}

impl<'a, S: RuleStore> SyncCommand<'a, S> {
    /// Create a new sync command.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Execute the sync command.
    ///
    /// The report is written even when some group operations failed; the
    /// returned error then carries the failure count.
    ///
    /// # Errors
    ///
    /// Returns an error if the run could not start or did not fully succeed.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &RuleArgs,
    ) -> Result<(), CliError> {
        let reconciler = Reconciler::new(self.store, reconcile_config(args))?;
        let rows = load_rows(&args.file)?;
        info!(rows = rows.len(), file = %args.file.display(), "loaded desired state");

        let (plan, report) = reconciler.sync(&rows).await?;
        let summary = SyncSummary {
            plan: PlanSummary::from_plan(&args.folder, &plan),
            report,
        };
        format.write(out, &summary)?;

        if summary.report.is_success() {
            Ok(())
        } else {
            warn!(failed = summary.report.failed.len(), "sync incomplete");
            Err(CliError::Incomplete {
                failed: summary.report.failed.len(),
            })
        }
    }
}
