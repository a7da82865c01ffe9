//! Alert-rule reconciliation engine.
//!
//! `rulesync-core` turns a declarative table of desired alert rules into the
//! minimal set of group writes and deletes that converge a remote alerting
//! service onto it.
//!
//! # Pipeline
//!
//! - **Identity**: every row is scoped to an entity whose [`ServiceHash`] is
//!   derived from a versioned [`IdentityLabelSet`]
//! - **Rendering**: rule types map to query templates filled in by the
//!   [`ExpressionRenderer`]
//! - **Desired state**: rows become ordered [`RuleGroup`]s keyed by [`GroupKey`]
//! - **Diff**: desired and installed groups are compared as whole groups
//! - **Apply**: changed groups are merged into the installed ones by rule title
//!   through a [`RuleStore`]
//!
//! # Example
//!
//! ```rust
//! use rulesync_core::{
//!     DesiredAlertRow, DesiredStateBuilder, ExistingState, IdentityLabels,
//!     ReconcileConfig, RuleType, ThresholdOp, diff,
//! };
//!
//! let row = DesiredAlertRow::new(
//!     RuleType::HttpRequests,
//!     "checkout",
//!     IdentityLabels::parse("region=us-east;kube_namespace=prod").unwrap(),
//!     ThresholdOp::GreaterThan,
//!     "100".parse().unwrap(),
//! );
//!
//! let desired = DesiredStateBuilder::new(&ReconcileConfig::default())
//!     .build(&[row])
//!     .unwrap();
//!
//! // Nothing is installed yet, so the single group is created.
//! let result = diff(&desired, &ExistingState::new());
//! assert_eq!(result.to_create.len(), 1);
//! assert!(result.to_delete.is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod apply;
pub mod config;
pub mod contact_points;
pub mod desired;
pub mod diff;
pub mod error;
pub mod existing;
pub mod identity;
pub mod loader;
pub mod notification_policies;
pub mod payload;
pub mod reconcile;
pub mod render;
pub mod store;
pub mod types;

// Re-export main types at crate root
pub use apply::{Applier, ApplyReport, GroupFailure, merge_by_title};
pub use config::{IdentityLabelSet, ReconcileConfig};
pub use contact_points::{
    ContactPoint, ContactPointReport, MANAGED_SUFFIX, load_contact_points, sync_contact_points,
};
pub use desired::{
    DesiredState, DesiredStateBuilder, GroupProjection, RenderedRule, RuleGroup, RuleMetadata,
};
pub use diff::{DiffResult, diff};
pub use error::{ReconcileError, Result};
pub use existing::{ExistingRuleGroup, ExistingState, InstalledRule};
pub use identity::{EntityIdentity, GroupKey, IdentityEngine, ServiceHash};
pub use loader::{load_rows, read_rows};
pub use notification_policies::{
    NotificationPolicyReport, ServicePolicy, load_policies, sync_notification_policies,
};
pub use payload::{GroupPayload, PayloadEncoder};
pub use reconcile::{Plan, Reconciler};
pub use render::{ExpressionRenderer, TemplateCatalog};
pub use store::{InMemoryRuleStore, RuleStore};
pub use types::{
    DesiredAlertRow, IdentityLabels, MatcherOp, Reducer, RuleType, SpanMatcher, Threshold,
    ThresholdOp,
};
