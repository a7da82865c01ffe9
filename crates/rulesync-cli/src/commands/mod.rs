//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`sync`] - Converge the managed folder
//! - [`plan`] - Dry-run of `sync`
//! - [`contact_points`] - Managed notification receivers
//! - [`notification_policies`] - Routes to the managed receivers
//!
//! Commands are generic over [`rulesync_core::RuleStore`] so they run the
//! same against Grafana and the in-memory store.

pub mod contact_points;
pub mod notification_policies;
pub mod plan;
pub mod sync;

pub use contact_points::ContactPointsCommand;
pub use notification_policies::NotificationPoliciesCommand;
pub use plan::PlanCommand;
pub use sync::SyncCommand;

use rulesync_core::ReconcileConfig;

use crate::cli::RuleArgs;

/// Builds the engine configuration from the `sync`/`plan` arguments.
#[must_use]
pub fn reconcile_config(args: &RuleArgs) -> ReconcileConfig {
    ReconcileConfig::default()
        .with_folder(args.folder.clone())
        .with_datasource(args.datasource.clone())
        .with_interval(args.interval.clone())
        .with_pending_for(args.pending_for.clone())
}
