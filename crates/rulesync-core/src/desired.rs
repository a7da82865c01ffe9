//! Desired-state construction.
//!
//! The [`DesiredStateBuilder`] turns the ordered rows of the desired-state
//! table into rule groups keyed by [`GroupKey`]. Row order is kept inside each
//! group and decides the disambiguation counters of duplicate titles.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, Result};
use crate::identity::{GroupKey, IdentityEngine, ServiceHash};
use crate::render::{ExpressionRenderer, SPAN_MATCHER_LABEL};
use crate::types::{DesiredAlertRow, Reducer, RuleType};

/// Machine-readable metadata attached to each rule.
///
/// Serialized into the `extraData` annotation only when the rule is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMetadata {
    /// Trigger type understood by the alert UI.
    pub apm_trigger_type: String,
    /// The entity name.
    pub service_name: String,
    /// The entity hash.
    pub service_hash: ServiceHash,
    /// Extra label terms shown next to the alert.
    pub additional_labels: Vec<String>,
    /// The identity labels of the row, as written.
    pub unique_labels: BTreeMap<String, String>,
}

/// One concrete alert rule ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedRule {
    /// Title, unique within its group.
    pub title: String,
    /// The rule type that produced this rule.
    pub rule_type: RuleType,
    /// Rendered query expression.
    pub expr: String,
    /// Reducer applied to the query result.
    pub reducer: Reducer,
    /// Trigger condition over the reduced value.
    pub condition: String,
    /// Metadata written to the `extraData` annotation.
    pub metadata: RuleMetadata,
    /// Notification channels, each becoming a `"true"` label.
    pub channels: Vec<String>,
}

/// A group of rules for one entity identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    /// The group key.
    pub key: GroupKey,
    /// Rules in input row order.
    pub rules: Vec<RenderedRule>,
    /// Evaluation interval.
    pub interval: String,
    /// Title of the folder the group lives in.
    pub folder: String,
}

impl RuleGroup {
    /// Returns the comparable projection used by the diff engine.
    #[must_use]
    pub fn projection(&self) -> GroupProjection {
        let mut projection = GroupProjection::default();
        for rule in &self.rules {
            projection.exprs.push(rule.expr.clone());
            projection.reducers.push(rule.reducer.as_str().to_string());
            projection.conditions.push(rule.condition.clone());
            projection.titles.push(rule.title.clone());
        }
        projection
    }
}

/// The four order-sensitive fields compared between desired and existing groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupProjection {
    /// Query expressions.
    pub exprs: Vec<String>,
    /// Reducer names.
    pub reducers: Vec<String>,
    /// Condition expressions.
    pub conditions: Vec<String>,
    /// Rule titles.
    pub titles: Vec<String>,
}

impl GroupProjection {
    /// Returns the number of rules projected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    /// Returns true if no rule was projected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// The full desired state: group key to group.
pub type DesiredState = BTreeMap<GroupKey, RuleGroup>;

/// Builds the desired state from ordered rows.
#[derive(Debug, Clone)]
pub struct DesiredStateBuilder {
    identity: IdentityEngine,
    renderer: ExpressionRenderer,
    folder: String,
    window: String,
    shard: u32,
    interval: String,
}

impl DesiredStateBuilder {
    /// Creates a builder with the default threshold templates.
    #[must_use]
    pub fn new(config: &ReconcileConfig) -> Self {
        Self::with_renderer(config, ExpressionRenderer::default())
    }

    /// Creates a builder with a custom renderer.
    #[must_use]
    pub fn with_renderer(config: &ReconcileConfig, renderer: ExpressionRenderer) -> Self {
        Self {
            identity: IdentityEngine::new(config.identity.clone()),
            renderer,
            folder: config.folder.clone(),
            window: config.window.clone(),
            shard: config.shard,
            interval: config.interval.clone(),
        }
    }

    /// Builds the desired state.
    ///
    /// Any row that fails identity derivation or rendering fails the whole
    /// build; no partial state is returned.
    pub fn build(&self, rows: &[DesiredAlertRow]) -> Result<DesiredState> {
        let mut groups = DesiredState::new();
        let mut title_counts: HashMap<(GroupKey, String), usize> = HashMap::new();

        for (idx, row) in rows.iter().enumerate() {
            let row_error = |err: ReconcileError| annotate_row(err, idx + 1);

            let identity = self
                .identity
                .derive(&row.entity, &row.identity_labels)
                .map_err(row_error)?;
            let expr = self.renderer.render(row, &identity).map_err(row_error)?;
            let key = GroupKey::new(&identity, &self.window, self.shard);

            let base_title = format!("{}_{}", row.rule_type, identity.hash);
            let count = title_counts
                .entry((key.clone(), base_title.clone()))
                .and_modify(|c| *c += 1)
                .or_insert(1);
            let title = if *count == 1 {
                base_title
            } else {
                format!("{base_title}_{count}")
            };

            let span_pattern = row
                .span_matcher
                .as_ref()
                .map_or("", |m| m.pattern.as_str());
            let metadata = RuleMetadata {
                apm_trigger_type: row.rule_type.trigger_type().to_string(),
                service_name: row.entity.clone(),
                service_hash: identity.hash.clone(),
                additional_labels: vec![
                    format!("{SPAN_MATCHER_LABEL}=\"{span_pattern}\""),
                    format!("span_type=\"{}\"", row.rule_type.span_type()),
                ],
                unique_labels: row
                    .identity_labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            };

            debug!(group = %key, title = %title, "rendered rule");

            let rule = RenderedRule {
                title,
                rule_type: row.rule_type,
                expr,
                reducer: row.reducer,
                condition: row.condition_expression(),
                metadata,
                channels: row.channels.clone(),
            };

            groups
                .entry(key.clone())
                .or_insert_with(|| RuleGroup {
                    key,
                    rules: Vec::new(),
                    interval: self.interval.clone(),
                    folder: self.folder.clone(),
                })
                .rules
                .push(rule);
        }

        Ok(groups)
    }
}

fn annotate_row(err: ReconcileError, row: usize) -> ReconcileError {
    match err {
        ReconcileError::Configuration { reason } => {
            ReconcileError::configuration(format!("row {row}: {reason}"))
        }
        ReconcileError::Template { reason } => {
            ReconcileError::template(format!("row {row}: {reason}"))
        }
        other => other,
    }
}
