//! Wire payloads for the remote ruler API.
//!
//! Rules are evaluated in three stages: a query (`A`) against the metrics
//! datasource, a reduction (`B`) of the query series and a math expression
//! (`C`) that compares the reduced value against the threshold. The typed
//! [`RuleMetadata`] is serialized to its `extraData` annotation here and
//! nowhere else.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ReconcileConfig, parse_duration_ms};
use crate::desired::RenderedRule;
use crate::error::Result;

/// Datasource uid of the server-side expression engine.
pub const EXPRESSION_DATASOURCE_UID: &str = "__expr__";

/// Reference id of the stage whose result decides whether the rule fires.
pub const CONDITION_REF_ID: &str = "C";

/// Annotation linking a firing alert back to its detail page.
pub const SOURCE_URL_TEMPLATE: &str = "{{ reReplaceAll pathPrefix \"\" externalURL }}/#/alerts/details/{{ $labels.__alert_rule_uid__ }}?folderTitle={{ $labels.grafana_folder }}{{ range $key, $value := $labels }}&matcher={{ $key }}%3D{{ $value }}{{ end }}";

const QUERY_LOOKBACK_SECS: u64 = 600;
const MAX_DATA_POINTS: u64 = 43_200;

/// A whole rule group as written to the ruler API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPayload {
    /// Group name.
    pub name: String,
    /// Evaluation interval.
    pub interval: String,
    /// Rule payloads in evaluation order.
    pub rules: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct RulePayload<'a> {
    #[serde(rename = "for")]
    pending_for: &'a str,
    annotations: BTreeMap<&'static str, String>,
    labels: BTreeMap<String, String>,
    grafana_alert: AlertPayload<'a>,
}

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    title: &'a str,
    condition: &'static str,
    no_data_state: &'static str,
    exec_err_state: &'static str,
    data: Vec<Stage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Stage<'a> {
    ref_id: &'static str,
    query_type: &'static str,
    relative_time_range: TimeRange,
    datasource_uid: &'a str,
    model: StageModel<'a>,
}

#[derive(Debug, Serialize)]
struct TimeRange {
    from: u64,
    to: u64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum StageModel<'a> {
    Query {
        #[serde(rename = "refId")]
        ref_id: &'static str,
        expr: &'a str,
        #[serde(rename = "intervalMs")]
        interval_ms: u64,
        #[serde(rename = "maxDataPoints")]
        max_data_points: u64,
        hide: bool,
    },
    Expression {
        #[serde(rename = "refId")]
        ref_id: &'static str,
        #[serde(rename = "type")]
        kind: &'static str,
        expression: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        reducer: Option<&'static str>,
        hide: bool,
    },
}

/// Serializes rendered rules into ruler API payloads.
#[derive(Debug, Clone)]
pub struct PayloadEncoder {
    datasource_uid: String,
    pending_for: String,
    routing_label: String,
    interval_ms: u64,
}

impl PayloadEncoder {
    /// Creates an encoder that stamps rules with `datasource_uid`.
    pub fn new(config: &ReconcileConfig, datasource_uid: impl Into<String>) -> Result<Self> {
        Ok(Self {
            datasource_uid: datasource_uid.into(),
            pending_for: config.pending_for.clone(),
            routing_label: config.routing_label.clone(),
            interval_ms: parse_duration_ms(&config.interval)?,
        })
    }

    /// Encodes one rule.
    pub fn rule(&self, rule: &RenderedRule) -> Result<Value> {
        let mut annotations = BTreeMap::new();
        annotations.insert("alertType", "threshold".to_string());
        annotations.insert("forWindow", "5m".to_string());
        annotations.insert("ruleType", "apm".to_string());
        annotations.insert("Summary", rule.title.clone());
        annotations.insert("summary", rule.title.clone());
        annotations.insert("extraData", serde_json::to_string(&rule.metadata)?);
        annotations.insert("source", SOURCE_URL_TEMPLATE.to_string());

        let mut labels = BTreeMap::new();
        labels.insert(self.routing_label.clone(), "true".to_string());
        for channel in &rule.channels {
            labels.insert(channel.clone(), "true".to_string());
        }

        let payload = RulePayload {
            pending_for: &self.pending_for,
            annotations,
            labels,
            grafana_alert: AlertPayload {
                title: &rule.title,
                condition: CONDITION_REF_ID,
                no_data_state: "OK",
                exec_err_state: "Error",
                data: vec![
                    Stage {
                        ref_id: "A",
                        query_type: "",
                        relative_time_range: TimeRange {
                            from: QUERY_LOOKBACK_SECS,
                            to: 0,
                        },
                        datasource_uid: &self.datasource_uid,
                        model: StageModel::Query {
                            ref_id: "A",
                            expr: &rule.expr,
                            interval_ms: self.interval_ms,
                            max_data_points: MAX_DATA_POINTS,
                            hide: false,
                        },
                    },
                    Stage {
                        ref_id: "B",
                        query_type: "",
                        relative_time_range: TimeRange { from: 0, to: 0 },
                        datasource_uid: EXPRESSION_DATASOURCE_UID,
                        model: StageModel::Expression {
                            ref_id: "B",
                            kind: "reduce",
                            expression: "A",
                            reducer: Some(rule.reducer.as_str()),
                            hide: false,
                        },
                    },
                    Stage {
                        ref_id: CONDITION_REF_ID,
                        query_type: "",
                        relative_time_range: TimeRange { from: 0, to: 0 },
                        datasource_uid: EXPRESSION_DATASOURCE_UID,
                        model: StageModel::Expression {
                            ref_id: CONDITION_REF_ID,
                            kind: "math",
                            expression: &rule.condition,
                            reducer: None,
                            hide: false,
                        },
                    },
                ],
            },
        };

        Ok(serde_json::to_value(payload)?)
    }
}
