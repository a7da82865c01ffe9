//! Projection of the rules currently installed remotely.
//!
//! Remote payloads are converted into [`ExistingRuleGroup`] as soon as they
//! cross the store boundary. Only the title and the three model fragments take
//! part in diffing; the raw payload is kept so untouched rules can be written
//! back exactly as they were read.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::desired::GroupProjection;
use crate::identity::GroupKey;

/// One rule as installed remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledRule {
    /// Rule title.
    pub title: String,
    /// Query expression of the query stage.
    pub expr: String,
    /// Reducer of the reduce stage.
    pub reducer: String,
    /// Expression of the math stage.
    pub condition: String,
    /// The rule exactly as returned by the remote service.
    pub raw: Value,
}

impl InstalledRule {
    /// Extracts the diffable fields of a remote rule.
    ///
    /// Missing fragments project as empty strings, which never equal a
    /// rendered value and therefore force an upsert.
    #[must_use]
    pub fn from_value(raw: Value) -> Self {
        let alert = &raw["grafana_alert"];
        let title = str_field(&alert["title"]);

        let mut expr = String::new();
        let mut reducer = String::new();
        let mut condition = String::new();
        if let Some(stages) = alert["data"].as_array() {
            for stage in stages {
                let model = &stage["model"];
                match stage["refId"].as_str() {
                    Some("A") => expr = str_field(&model["expr"]),
                    Some("B") => reducer = str_field(&model["reducer"]),
                    Some("C") => condition = str_field(&model["expression"]),
                    _ => {}
                }
            }
        }

        Self {
            title,
            expr,
            reducer,
            condition,
            raw,
        }
    }

    /// Returns the remote uid of the rule, if the service assigned one.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.raw["grafana_alert"]["uid"].as_str()
    }
}

fn str_field(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

/// A rule group as installed remotely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExistingRuleGroup {
    /// Group name.
    pub name: String,
    /// Evaluation interval.
    pub interval: String,
    /// Installed rules in remote order.
    pub rules: Vec<InstalledRule>,
}

impl ExistingRuleGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Converts a `{name, interval, rules}` group payload.
    #[must_use]
    pub fn from_value(name: impl Into<String>, raw: &Value) -> Self {
        let rules = raw["rules"]
            .as_array()
            .map(|rules| rules.iter().cloned().map(InstalledRule::from_value).collect())
            .unwrap_or_default();
        Self {
            name: name.into(),
            interval: str_field(&raw["interval"]),
            rules,
        }
    }

    /// Returns true if no rule is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the comparable projection used by the diff engine.
    #[must_use]
    pub fn projection(&self) -> GroupProjection {
        let mut projection = GroupProjection::default();
        for rule in &self.rules {
            projection.exprs.push(rule.expr.clone());
            projection.reducers.push(rule.reducer.clone());
            projection.conditions.push(rule.condition.clone());
            projection.titles.push(rule.title.clone());
        }
        projection
    }
}

/// The full existing state: group name to installed group.
pub type ExistingState = BTreeMap<GroupKey, ExistingRuleGroup>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote_rule(title: &str, expr: &str) -> Value {
        json!({
            "for": "0s",
            "grafana_alert": {
                "uid": format!("uid-{title}"),
                "title": title,
                "condition": "C",
                "data": [
                    {"refId": "A", "model": {"expr": expr}},
                    {"refId": "B", "model": {"type": "reduce", "reducer": "mean"}},
                    {"refId": "C", "model": {"type": "math", "expression": "$B > 5"}},
                ],
            },
        })
    }

    #[test]
    fn projects_fragments_by_ref_id() {
        let rule = InstalledRule::from_value(remote_rule("t1", "up"));
        assert_eq!(rule.title, "t1");
        assert_eq!(rule.expr, "up");
        assert_eq!(rule.reducer, "mean");
        assert_eq!(rule.condition, "$B > 5");
        assert_eq!(rule.uid(), Some("uid-t1"));
    }

    #[test]
    fn missing_fragments_are_empty() {
        let rule = InstalledRule::from_value(json!({"grafana_alert": {"title": "bare"}}));
        assert_eq!(rule.title, "bare");
        assert!(rule.expr.is_empty());
        assert!(rule.reducer.is_empty());
        assert!(rule.condition.is_empty());
        assert_eq!(rule.uid(), None);
    }

    #[test]
    fn group_projection_keeps_remote_order() {
        let raw = json!({
            "name": "g",
            "interval": "1m",
            "rules": [remote_rule("b", "x"), remote_rule("a", "y")],
        });
        let group = ExistingRuleGroup::from_value("g", &raw);
        assert_eq!(group.interval, "1m");
        let projection = group.projection();
        assert_eq!(projection.titles, vec!["b", "a"]);
        assert_eq!(projection.exprs, vec!["x", "y"]);
    }

    #[test]
    fn group_without_rules_is_empty() {
        let group = ExistingRuleGroup::from_value("g", &json!({"name": "g"}));
        assert!(group.is_empty());
        assert!(ExistingRuleGroup::empty("g").projection().is_empty());
    }
}
