//! Applying a diff to the remote store.
//!
//! Deletes run first, then upserts. Every upsert re-reads the installed group
//! and merges the desired rules into it by title, so rules the engine does not
//! manage keep their position and remote bookkeeping.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::desired::{DesiredState, RuleGroup};
use crate::diff::DiffResult;
use crate::error::{ReconcileError, Result};
use crate::existing::InstalledRule;
use crate::payload::{GroupPayload, PayloadEncoder};
use crate::store::RuleStore;

/// Merges desired rules into an installed rule list by title.
///
/// Installed rules keep their order. A rule whose title is desired is replaced
/// in place, inheriting the remote uid when the replacement has none; other
/// installed rules are left untouched. Desired rules that matched nothing are
/// appended in their desired order. An empty installed list yields the desired
/// rules verbatim.
#[must_use]
pub fn merge_by_title(installed: &[InstalledRule], desired: Vec<(String, Value)>) -> Vec<Value> {
    if installed.is_empty() {
        return desired.into_iter().map(|(_, rule)| rule).collect();
    }

    let order: Vec<String> = desired.iter().map(|(title, _)| title.clone()).collect();
    let mut pending: HashMap<String, Value> = desired.into_iter().collect();
    let mut merged = Vec::with_capacity(installed.len() + pending.len());

    for rule in installed {
        match pending.remove(&rule.title) {
            Some(mut replacement) => {
                inherit_uid(&mut replacement, rule);
                merged.push(replacement);
            }
            None => merged.push(rule.raw.clone()),
        }
    }

    for title in order {
        if let Some(rule) = pending.remove(&title) {
            merged.push(rule);
        }
    }

    merged
}

fn inherit_uid(replacement: &mut Value, installed: &InstalledRule) {
    let Some(uid) = installed.uid() else {
        return;
    };
    if let Some(alert) = replacement
        .get_mut("grafana_alert")
        .and_then(Value::as_object_mut)
    {
        alert
            .entry("uid")
            .or_insert_with(|| Value::String(uid.to_string()));
    }
}

/// A group operation that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupFailure {
    /// Group name.
    pub group: String,
    /// The error reported for it.
    pub error: String,
}

/// Outcome of applying one diff.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// Groups created.
    pub created: Vec<String>,
    /// Groups replaced.
    pub updated: Vec<String>,
    /// Groups deleted.
    pub deleted: Vec<String>,
    /// Groups whose operation failed.
    pub failed: Vec<GroupFailure>,
    /// Set when a transport error stopped the remaining queue.
    pub aborted: Option<String>,
    /// When the apply started.
    pub started_at: DateTime<Utc>,
    /// When the apply finished.
    pub finished_at: DateTime<Utc>,
}

impl ApplyReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            failed: Vec::new(),
            aborted: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// Returns true if every operation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_none()
    }

    /// Returns the number of successful mutations.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Records a failure; returns true if the queue must stop.
    fn record_failure(&mut self, group: &str, err: &ReconcileError) -> bool {
        error!(group = %group, error = %err, "group operation failed");
        self.failed.push(GroupFailure {
            group: group.to_string(),
            error: err.to_string(),
        });
        if err.is_transport() {
            self.aborted = Some(err.to_string());
            return true;
        }
        false
    }
}

/// Applies diffs against a [`RuleStore`].
#[derive(Debug)]
pub struct Applier<'a, S> {
    store: &'a S,
    encoder: PayloadEncoder,
    folder: String,
}

impl<'a, S: RuleStore> Applier<'a, S> {
    /// Creates an applier writing into the folder titled `folder`.
    pub fn new(store: &'a S, encoder: PayloadEncoder, folder: impl Into<String>) -> Self {
        Self {
            store,
            encoder,
            folder: folder.into(),
        }
    }

    /// Applies `diff`.
    ///
    /// `folder_uid` is the uid found while reading existing state; when it is
    /// `None` the folder is created before the first upsert. Failures are
    /// recorded per group. A transport error stops the remaining queue.
    pub async fn apply(
        &self,
        desired: &DesiredState,
        diff: &DiffResult,
        folder_uid: Option<&str>,
    ) -> ApplyReport {
        let mut report = ApplyReport::start();

        if let Some(folder_uid) = folder_uid {
            for key in &diff.to_delete {
                match self.store.delete_group(folder_uid, key.as_str()).await {
                    Ok(()) => {
                        info!(group = %key, "deleted group");
                        report.deleted.push(key.to_string());
                    }
                    Err(err) => {
                        if report.record_failure(key.as_str(), &err) {
                            return finish(report);
                        }
                    }
                }
            }
        } else if !diff.to_delete.is_empty() {
            debug!(folder = %self.folder, "folder absent, nothing to delete");
        }

        let mut folder_uid = folder_uid.map(str::to_string);
        for (group, created) in diff.upserts(desired) {
            let uid = match &folder_uid {
                Some(uid) => uid.clone(),
                None => match self.ensure_folder().await {
                    Ok(uid) => {
                        folder_uid = Some(uid.clone());
                        uid
                    }
                    Err(err) => {
                        if report.record_failure(group.key.as_str(), &err) {
                            return finish(report);
                        }
                        continue;
                    }
                },
            };

            match self.upsert(&uid, group).await {
                Ok(()) if created => {
                    info!(group = %group.key, rules = group.rules.len(), "created group");
                    report.created.push(group.key.to_string());
                }
                Ok(()) => {
                    info!(group = %group.key, rules = group.rules.len(), "updated group");
                    report.updated.push(group.key.to_string());
                }
                Err(err) => {
                    if report.record_failure(group.key.as_str(), &err) {
                        return finish(report);
                    }
                }
            }
        }

        finish(report)
    }

    async fn ensure_folder(&self) -> Result<String> {
        if let Some(uid) = self.store.find_folder(&self.folder).await? {
            return Ok(uid);
        }
        let uid = self.store.create_folder(&self.folder).await?;
        info!(folder = %self.folder, uid = %uid, "created folder");
        Ok(uid)
    }

    async fn upsert(&self, folder_uid: &str, group: &RuleGroup) -> Result<()> {
        let installed = self.store.get_group(folder_uid, group.key.as_str()).await?;
        let desired = group
            .rules
            .iter()
            .map(|rule| -> Result<(String, Value)> {
                Ok((rule.title.clone(), self.encoder.rule(rule)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let foreign = installed
            .rules
            .iter()
            .filter(|r| !group.rules.iter().any(|d| d.title == r.title))
            .count();
        if foreign > 0 {
            warn!(group = %group.key, foreign, "keeping unmanaged rules in group");
        }

        let payload = GroupPayload {
            name: group.key.to_string(),
            interval: group.interval.clone(),
            rules: merge_by_title(&installed.rules, desired),
        };
        self.store.write_group(folder_uid, &payload).await
    }
}

fn finish(mut report: ApplyReport) -> ApplyReport {
    report.finished_at = Utc::now();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcileConfig;
    use crate::desired::DesiredStateBuilder;
    use crate::diff::diff;
    use crate::existing::ExistingState;
    use crate::identity::GroupKey;
    use crate::store::InMemoryRuleStore;
    use crate::types::{DesiredAlertRow, IdentityLabels, RuleType, ThresholdOp};
    use serde_json::json;

    fn installed(title: &str, marker: &str) -> InstalledRule {
        InstalledRule::from_value(json!({
            "grafana_alert": {"uid": format!("uid-{title}"), "title": title},
            "marker": marker,
        }))
    }

    fn desired_rule(title: &str, marker: &str) -> (String, Value) {
        (
            title.to_string(),
            json!({"grafana_alert": {"title": title}, "marker": marker}),
        )
    }

    fn markers(rules: &[Value]) -> Vec<String> {
        rules
            .iter()
            .map(|r| {
                format!(
                    "{}:{}",
                    r["grafana_alert"]["title"].as_str().unwrap_or_default(),
                    r["marker"].as_str().unwrap_or_default()
                )
            })
            .collect()
    }

    #[test]
    fn merge_replaces_in_place_and_appends_new() {
        let installed = vec![
            installed("A", "old"),
            installed("B", "old"),
            installed("C", "old"),
        ];
        let merged = merge_by_title(
            &installed,
            vec![desired_rule("B", "new"), desired_rule("D", "new")],
        );
        assert_eq!(markers(&merged), vec!["A:old", "B:new", "C:old", "D:new"]);
    }

    #[test]
    fn merge_replacement_inherits_uid() {
        let installed = vec![installed("A", "old")];
        let merged = merge_by_title(&installed, vec![desired_rule("A", "new")]);
        assert_eq!(merged[0]["grafana_alert"]["uid"], "uid-A");
        assert_eq!(merged[0]["marker"], "new");
    }

    #[test]
    fn merge_into_empty_group_is_verbatim() {
        let merged = merge_by_title(&[], vec![desired_rule("B", "x"), desired_rule("A", "y")]);
        assert_eq!(markers(&merged), vec!["B:x", "A:y"]);
    }

    #[test]
    fn merge_keeps_foreign_rules() {
        let installed = vec![installed("X", "foreign")];
        let merged = merge_by_title(&installed, vec![desired_rule("A", "new")]);
        assert_eq!(markers(&merged), vec!["X:foreign", "A:new"]);
    }

    fn desired(entities: &[&str]) -> DesiredState {
        let rows: Vec<_> = entities
            .iter()
            .map(|entity| {
                DesiredAlertRow::new(
                    RuleType::HttpRequests,
                    *entity,
                    IdentityLabels::default(),
                    ThresholdOp::GreaterThan,
                    "1".parse().expect("threshold"),
                )
            })
            .collect();
        DesiredStateBuilder::new(&ReconcileConfig::default())
            .build(&rows)
            .expect("build")
    }

    fn encoder() -> PayloadEncoder {
        PayloadEncoder::new(&ReconcileConfig::default(), "ds").expect("encoder")
    }

    #[tokio::test]
    async fn creates_folder_before_first_upsert() {
        let store = InMemoryRuleStore::new();
        let desired = desired(&["checkout"]);
        let plan = diff(&desired, &ExistingState::new());

        let applier = Applier::new(&store, encoder(), "alerts");
        let report = applier.apply(&desired, &plan, None).await;

        assert!(report.is_success());
        assert_eq!(report.created.len(), 1);
        let mutations = store.mutations();
        assert_eq!(mutations[0], "create folder alerts");
        assert!(mutations[1].starts_with("write checkout_"));
    }

    #[tokio::test]
    async fn remote_failure_is_isolated_per_group() {
        let store = InMemoryRuleStore::new();
        let desired = desired(&["cart", "checkout"]);
        let plan = diff(&desired, &ExistingState::new());
        let cart: &GroupKey = plan.to_create.iter().next().expect("cart group");
        store.fail_group(cart.as_str());

        let applier = Applier::new(&store, encoder(), "alerts");
        let report = applier.apply(&desired, &plan, None).await;

        assert!(!report.is_success());
        assert!(report.aborted.is_none());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].group, cart.as_str());
        assert_eq!(report.created.len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_aborts_queue() {
        let store = InMemoryRuleStore::new();
        let folder = store.create_folder("alerts").await.expect("folder");
        store.set_offline(true);
        let desired = desired(&["cart", "checkout"]);
        let plan = diff(&desired, &ExistingState::new());

        let applier = Applier::new(&store, encoder(), "alerts");
        let report = applier.apply(&desired, &plan, Some(&folder)).await;

        assert!(report.aborted.is_some());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.mutation_count(), 0);
    }

    #[tokio::test]
    async fn delete_of_absent_group_succeeds() {
        let store = InMemoryRuleStore::new();
        let folder = store.create_folder("alerts").await.expect("folder");
        let mut plan = DiffResult::default();
        plan.to_delete.insert(GroupKey::from_remote("gone"));

        let applier = Applier::new(&store, encoder(), "alerts");
        let report = applier
            .apply(&DesiredState::new(), &plan, Some(&folder))
            .await;

        assert!(report.is_success());
        assert_eq!(report.deleted, vec!["gone"]);
    }
}
