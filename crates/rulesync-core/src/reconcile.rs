//! Run orchestration: build, read, diff and apply.
//!
//! Input errors surface before the first remote call. Failures while reading
//! existing state abort the run, since a diff over partial state would mark
//! live groups for deletion.

use tracing::{debug, info};

use crate::apply::{Applier, ApplyReport};
use crate::config::ReconcileConfig;
use crate::desired::{DesiredState, DesiredStateBuilder};
use crate::diff::{DiffResult, diff};
use crate::error::{ReconcileError, Result};
use crate::existing::ExistingState;
use crate::identity::GroupKey;
use crate::payload::PayloadEncoder;
use crate::store::RuleStore;
use crate::types::DesiredAlertRow;

/// Everything computed before the first mutation of a run.
#[derive(Debug, Clone)]
pub struct Plan {
    /// The desired state.
    pub desired: DesiredState,
    /// The state read from the remote store.
    pub existing: ExistingState,
    /// The diff between the two.
    pub diff: DiffResult,
    /// Uid of the managed folder, if it exists.
    pub folder_uid: Option<String>,
    /// Uid of the datasource rules query.
    pub datasource_uid: String,
}

/// Drives reconciliation runs against a [`RuleStore`].
#[derive(Debug)]
pub struct Reconciler<'a, S> {
    store: &'a S,
    config: ReconcileConfig,
    builder: DesiredStateBuilder,
}

impl<'a, S: RuleStore> Reconciler<'a, S> {
    /// Creates a reconciler.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(store: &'a S, config: ReconcileConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            builder: DesiredStateBuilder::new(&config),
            config,
        })
    }

    /// Creates a reconciler with a custom desired-state builder.
    pub fn with_builder(
        store: &'a S,
        config: ReconcileConfig,
        builder: DesiredStateBuilder,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            builder,
        })
    }

    /// Returns the run configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Builds desired state, reads existing state and diffs them.
    ///
    /// Nothing is written.
    pub async fn plan(&self, rows: &[DesiredAlertRow]) -> Result<Plan> {
        let desired = self.builder.build(rows)?;
        debug!(groups = desired.len(), rows = rows.len(), "built desired state");

        let datasource_uid = self
            .store
            .datasource_uid(&self.config.datasource)
            .await?
            .ok_or_else(|| {
                ReconcileError::configuration(format!(
                    "datasource '{}' not found",
                    self.config.datasource
                ))
            })?;

        let folder_uid = self.store.find_folder(&self.config.folder).await?;
        let existing = match &folder_uid {
            Some(uid) => self.fetch_existing(uid).await?,
            None => {
                debug!(folder = %self.config.folder, "managed folder absent");
                ExistingState::new()
            }
        };

        let diff = diff(&desired, &existing);
        info!(
            create = diff.to_create.len(),
            update = diff.to_update.len(),
            delete = diff.to_delete.len(),
            unchanged = diff.unchanged.len(),
            "computed diff"
        );

        Ok(Plan {
            desired,
            existing,
            diff,
            folder_uid,
            datasource_uid,
        })
    }

    /// Applies a plan.
    ///
    /// Per-group failures are reported in the returned [`ApplyReport`]; the
    /// error path is reserved for failures before the first mutation.
    pub async fn apply(&self, plan: &Plan) -> Result<ApplyReport> {
        let encoder = PayloadEncoder::new(&self.config, plan.datasource_uid.clone())?;
        let applier = Applier::new(self.store, encoder, self.config.folder.clone());
        Ok(applier
            .apply(&plan.desired, &plan.diff, plan.folder_uid.as_deref())
            .await)
    }

    /// Plans and applies in one step.
    pub async fn sync(&self, rows: &[DesiredAlertRow]) -> Result<(Plan, ApplyReport)> {
        let plan = self.plan(rows).await?;
        let report = self.apply(&plan).await?;
        Ok((plan, report))
    }

    async fn fetch_existing(&self, folder_uid: &str) -> Result<ExistingState> {
        let mut existing = ExistingState::new();
        for name in self.store.list_groups(folder_uid).await? {
            let group = self.store.get_group(folder_uid, &name).await?;
            existing.insert(GroupKey::from_remote(name), group);
        }
        debug!(groups = existing.len(), "read existing state");
        Ok(existing)
    }
}
