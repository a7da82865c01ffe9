//! Query expression rendering.
//!
//! Each [`RuleType`] maps to one PromQL template with `{{ name }}`
//! placeholders. The renderer builds the label matcher clause for a row and
//! substitutes it, together with the grouping label and the identity label
//! names, into the template.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{ReconcileError, Result};
use crate::identity::EntityIdentity;
use crate::types::{DesiredAlertRow, MatcherOp, RuleType};

/// Label the backend groups series by; rendered for `{{ service_hash }}`.
pub const GROUPING_LABEL: &str = "service_hash";

/// Label carrying the entity name in the metrics.
pub const ENTITY_MATCHER_LABEL: &str = "service_name";

/// Label carrying the secondary (span name) dimension.
pub const SPAN_MATCHER_LABEL: &str = "span_name";

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").ok());

/// Table of query templates keyed by rule type.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<RuleType, String>,
}

impl TemplateCatalog {
    /// Creates an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The threshold templates for HTTP span metrics.
    #[must_use]
    pub fn threshold() -> Self {
        let mut catalog = Self::new();
        catalog.register(
            RuleType::ErrorRate,
            r#"((sum by ({{ service_hash }}) (rate(edge_latency_count{error="true",{{ matcher }}, kf_source="apm"}[300s]))) OR (sum by ( {{ service_hash }} ) (rate(edge_latency_count{ {{ matcher }}, kf_source="apm"}[300s])) * 0)) * 100.0 / sum by ({{ service_hash }}) (rate(edge_latency_count{ {{ matcher }}, kf_source="apm"}[300s]))"#,
        );
        catalog.register(
            RuleType::HttpRequests,
            r#"sum by ({{ service_hash }}) (rate(edge_latency_count{ {{ matcher }}, kf_source="apm"}[300s]))"#,
        );
        catalog.register(
            RuleType::HttpThroughput,
            r#"histogram_quantile(0.50, sum by ({{ service_hash }}, le) (rate(edge_latency_bucket{ {{ matcher }}, kf_source="apm"}[300s])))"#,
        );
        catalog.register(
            RuleType::Apdex,
            r#"clamp_max((sum by ({{ service_hash }}) (increase(edge_latency_bucket{ {{ matcher }}, le="2000",error!="true",kf_source="apm",span_type!="db"}[300s])) + sum by ({{ service_hash }}) (increase(edge_latency_bucket{ {{ matcher }}, le="500",error!="true",kf_source="apm",span_type!="db"}[300s])))/(2*sum by ({{ service_hash }}) (increase(edge_latency_count{ {{ matcher }}, kf_source="apm",span_type!="db"}[300s]))),1)"#,
        );
        for (rule_type, quantile) in [
            (RuleType::P50Latency, "0.50"),
            (RuleType::P75Latency, "0.75"),
            (RuleType::P90Latency, "0.90"),
            (RuleType::P95Latency, "0.95"),
            (RuleType::P99Latency, "0.99"),
        ] {
            catalog.register(
                rule_type,
                format!(
                    r#"histogram_quantile({quantile}, sum(rate(edge_latency_bucket{{ {{{{ matcher }}}}, kf_source="apm",span_type!="db"}}[300s])) by ({{{{ service_hash }}}}, le))"#
                ),
            );
        }
        catalog.register(
            RuleType::MaxLatency,
            r#"max(max_over_time(edge_latency_max{ {{ matcher }}, kf_source="apm",span_type!="db"}[300s])) by ({{ service_hash }})"#,
        );
        catalog.register(
            RuleType::MinLatency,
            r#"min(min_over_time(edge_latency_min{ {{ matcher }}, kf_source="apm",span_type!="db"}[300s])) by ({{ service_hash }})"#,
        );
        catalog.register(
            RuleType::AverageLatency,
            r#"sum by ({{ service_hash }}) (rate(edge_latency_sum{ {{ matcher }}, kf_source="apm",span_type!="db"}[300s])) / sum by ({{ service_hash }}) (rate(edge_latency_count{ {{ matcher }}, kf_source="apm",span_type!="db"}[300s]))"#,
        );
        catalog
    }

    /// Registers or replaces the template of a rule type.
    pub fn register(&mut self, rule_type: RuleType, template: impl Into<String>) {
        self.templates.insert(rule_type, template.into());
    }

    /// Returns the template of a rule type.
    #[must_use]
    pub fn get(&self, rule_type: RuleType) -> Option<&str> {
        self.templates.get(&rule_type).map(String::as_str)
    }

    /// Returns the number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns true if no template is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Anchors a regex pattern with `^`/`$` when the operator is a regex form.
///
/// Patterns for the exact-match operators are returned unchanged, as are
/// ends that already carry their anchor.
#[must_use]
pub fn anchor_pattern(pattern: &str, op: MatcherOp) -> String {
    if !op.is_regex() {
        return pattern.to_string();
    }
    let mut out = String::with_capacity(pattern.len() + 2);
    if !pattern.starts_with('^') {
        out.push('^');
    }
    out.push_str(pattern);
    if !pattern.ends_with('$') {
        out.push('$');
    }
    out
}

/// Builds the label matcher clause of a row.
///
/// The entity name comes first, then every identity label in row order, then
/// the span matcher when present.
pub fn matcher_clause(row: &DesiredAlertRow) -> Result<String> {
    let mut terms = Vec::with_capacity(row.identity_labels.len() + 2);
    terms.push(exact_term(ENTITY_MATCHER_LABEL, "=", &row.entity)?);
    for (key, value) in row.identity_labels.iter() {
        terms.push(exact_term(key, "=", value)?);
    }
    if let Some(span) = &row.span_matcher {
        let pattern = anchor_pattern(&span.pattern, span.op);
        terms.push(exact_term(SPAN_MATCHER_LABEL, span.op.as_symbol(), &pattern)?);
    }
    Ok(terms.join(", "))
}

fn exact_term(label: &str, op: &str, value: &str) -> Result<String> {
    if value.contains('"') {
        return Err(ReconcileError::template(format!(
            "value of label '{label}' contains a double quote: {value}"
        )));
    }
    Ok(format!("{label}{op}\"{value}\""))
}

/// Substitutes `{{ name }}` placeholders from `vars`.
///
/// Every placeholder must resolve; the first unresolved name is reported.
pub fn render_template(template: &str, vars: &BTreeMap<&str, String>) -> Result<String> {
    let placeholder = PLACEHOLDER
        .as_ref()
        .ok_or_else(|| ReconcileError::template("placeholder pattern failed to compile"))?;

    let mut missing: Option<String> = None;
    let rendered = placeholder.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        if let Some(value) = vars.get(name) {
            value.clone()
        } else {
            missing.get_or_insert_with(|| name.to_string());
            String::new()
        }
    });

    match missing {
        Some(name) => Err(ReconcileError::template(format!(
            "unresolved placeholder '{{{{ {name} }}}}'"
        ))),
        None => Ok(rendered.into_owned()),
    }
}

/// Renders query expressions for desired rows.
#[derive(Debug, Clone)]
pub struct ExpressionRenderer {
    catalog: TemplateCatalog,
}

impl ExpressionRenderer {
    /// Creates a renderer over a template catalogue.
    #[must_use]
    pub const fn new(catalog: TemplateCatalog) -> Self {
        Self { catalog }
    }

    /// Renders the query expression of `row`.
    pub fn render(&self, row: &DesiredAlertRow, identity: &EntityIdentity) -> Result<String> {
        let template = self.catalog.get(row.rule_type).ok_or_else(|| {
            ReconcileError::template(format!(
                "no template registered for rule type '{}'",
                row.rule_type
            ))
        })?;

        let mut vars = BTreeMap::new();
        vars.insert("matcher", matcher_clause(row)?);
        vars.insert("service_hash", GROUPING_LABEL.to_string());
        vars.insert(
            "service_id_labels",
            row.identity_labels.keys().collect::<Vec<_>>().join(","),
        );
        vars.insert("entity_hash", identity.hash.to_string());

        render_template(template, &vars)
    }
}

impl Default for ExpressionRenderer {
    fn default() -> Self {
        Self::new(TemplateCatalog::threshold())
    }
}
