//! Core types for the desired-state table.
//!
//! This module provides the strongly typed form of one input row:
//! - [`RuleType`]: The closed set of alert rule kinds
//! - [`MatcherOp`]: Label matcher operators for the secondary dimension
//! - [`ThresholdOp`]: Comparison operators for the trigger condition
//! - [`Reducer`]: Reduction applied to the query series before comparison
//! - [`IdentityLabels`]: Ordered `key=value` identity pairs of a row
//! - [`DesiredAlertRow`]: One fully parsed row

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

/// The kind of alert a row asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Percentage of requests that errored.
    ErrorRate,
    /// Request rate.
    HttpRequests,
    /// Median request throughput.
    HttpThroughput,
    /// Application performance index.
    Apdex,
    /// 50th percentile latency.
    P50Latency,
    /// 75th percentile latency.
    P75Latency,
    /// 90th percentile latency.
    P90Latency,
    /// 95th percentile latency.
    P95Latency,
    /// 99th percentile latency.
    P99Latency,
    /// Maximum latency.
    MaxLatency,
    /// Minimum latency.
    MinLatency,
    /// Mean latency.
    AverageLatency,
}

impl RuleType {
    /// Every supported rule type, in catalogue order.
    pub const ALL: [Self; 12] = [
        Self::ErrorRate,
        Self::HttpRequests,
        Self::HttpThroughput,
        Self::Apdex,
        Self::P50Latency,
        Self::P75Latency,
        Self::P90Latency,
        Self::P95Latency,
        Self::P99Latency,
        Self::MaxLatency,
        Self::MinLatency,
        Self::AverageLatency,
    ];

    /// Returns the key used in the desired-state table.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ErrorRate => "error_rate",
            Self::HttpRequests => "http_requests",
            Self::HttpThroughput => "http_throughput",
            Self::Apdex => "apdex",
            Self::P50Latency => "p50_latency",
            Self::P75Latency => "p75_latency",
            Self::P90Latency => "p90_latency",
            Self::P95Latency => "p95_latency",
            Self::P99Latency => "p99_latency",
            Self::MaxLatency => "max_latency",
            Self::MinLatency => "min_latency",
            Self::AverageLatency => "average_latency",
        }
    }

    /// Returns the trigger type recorded in the rule metadata.
    #[must_use]
    pub const fn trigger_type(&self) -> &'static str {
        match self {
            Self::ErrorRate => "ErrorRate",
            Self::HttpRequests => "RequestPerSecond",
            Self::HttpThroughput | Self::P50Latency => "p50",
            Self::P75Latency => "p75",
            Self::P90Latency => "p90",
            Self::P95Latency => "p95",
            Self::P99Latency => "p99",
            Self::MaxLatency => "max",
            Self::MinLatency => "min",
            Self::AverageLatency => "average",
            Self::Apdex => "apdex",
        }
    }

    /// Returns the span type the rule applies to.
    #[must_use]
    pub const fn span_type(&self) -> &'static str {
        "http"
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ReconcileError::configuration(format!("unknown rule type '{s}'")))
    }
}

/// Label matcher operator for the secondary (span name) dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatcherOp {
    /// Exact match (`=`).
    #[default]
    #[serde(rename = "=")]
    Equal,
    /// Negated exact match (`!=`).
    #[serde(rename = "!=")]
    NotEqual,
    /// Regex match (`=~`).
    #[serde(rename = "=~")]
    Regex,
    /// Negated regex match (`!~`).
    #[serde(rename = "!~")]
    NotRegex,
}

impl MatcherOp {
    /// Returns the operator symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Regex => "=~",
            Self::NotRegex => "!~",
        }
    }

    /// Returns true for the two regex operators.
    #[must_use]
    pub const fn is_regex(&self) -> bool {
        matches!(self, Self::Regex | Self::NotRegex)
    }
}

impl fmt::Display for MatcherOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_symbol())
    }
}

impl FromStr for MatcherOp {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "=" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            "=~" => Ok(Self::Regex),
            "!~" => Ok(Self::NotRegex),
            other => Err(ReconcileError::configuration(format!(
                "unknown matcher operator '{other}'"
            ))),
        }
    }
}

/// Comparison operator of the trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThresholdOp {
    /// Greater than (>).
    #[serde(rename = ">")]
    GreaterThan,
    /// Greater than or equal (>=).
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    /// Less than (<).
    #[serde(rename = "<")]
    LessThan,
    /// Less than or equal (<=).
    #[serde(rename = "<=")]
    LessThanOrEqual,
}

impl ThresholdOp {
    /// Returns the operator as a string symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
        }
    }
}

impl fmt::Display for ThresholdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_symbol())
    }
}

impl FromStr for ThresholdOp {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            ">" => Ok(Self::GreaterThan),
            ">=" => Ok(Self::GreaterThanOrEqual),
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessThanOrEqual),
            other => Err(ReconcileError::configuration(format!(
                "unknown threshold operator '{other}'"
            ))),
        }
    }
}

/// Reduction applied to the query result before the threshold comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    /// Last sample.
    #[default]
    Last,
    /// Arithmetic mean.
    Mean,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Sum.
    Sum,
    /// Number of samples.
    Count,
}

impl Reducer {
    /// Returns the reducer name as stored by the remote service.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Last => "last",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Count => "count",
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reducer {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "last" => Ok(Self::Last),
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            other => Err(ReconcileError::configuration(format!(
                "unknown reducer '{other}'"
            ))),
        }
    }
}

/// A numeric threshold that keeps the literal it was written as.
///
/// The literal is what ends up in the condition expression, so `100.0` in the
/// table stays `100.0` remotely and does not churn the diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    literal: String,
}

impl Threshold {
    /// Returns the threshold exactly as written in the input.
    #[must_use]
    pub fn literal(&self) -> &str {
        &self.literal
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

impl FromStr for Threshold {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        let literal = s.trim();
        let value: f64 = literal.parse().map_err(|_| {
            ReconcileError::configuration(format!("threshold '{s}' is not a number"))
        })?;
        if !value.is_finite() {
            return Err(ReconcileError::configuration(format!(
                "threshold '{s}' is not finite"
            )));
        }
        Ok(Self {
            literal: literal.to_string(),
        })
    }
}

/// Identity labels of a row, in the order they were written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLabels(Vec<(String, String)>);

impl IdentityLabels {
    /// Creates identity labels from ordered pairs.
    #[must_use]
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    /// Parses a `;`-joined list of `key=value` pairs.
    ///
    /// Empty segments are skipped; a segment without `=`, with an empty key or
    /// repeating an earlier key is a configuration error. The value may itself
    /// contain `=`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                ReconcileError::configuration(format!(
                    "identity label '{segment}' is not a key=value pair"
                ))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ReconcileError::configuration(format!(
                    "identity label '{segment}' has an empty key"
                )));
            }
            if pairs.iter().any(|(k, _)| k == key) {
                return Err(ReconcileError::configuration(format!(
                    "identity label '{key}' given twice"
                )));
            }
            pairs.push((key.to_string(), value.trim().to_string()));
        }
        Ok(Self(pairs))
    }

    /// Returns the value of a label, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates the pairs in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the label names in input order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Returns the number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Optional secondary matcher (span name filter) of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanMatcher {
    /// The raw pattern as written in the table.
    pub pattern: String,
    /// The comparison operator.
    pub op: MatcherOp,
}

/// One row of the desired-state table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredAlertRow {
    /// The kind of alert.
    pub rule_type: RuleType,
    /// The monitored entity (service) name.
    pub entity: String,
    /// Identity labels scoping the entity.
    pub identity_labels: IdentityLabels,
    /// Secondary matcher; `None` when the pattern column is empty.
    pub span_matcher: Option<SpanMatcher>,
    /// Reducer; defaults to [`Reducer::Last`].
    pub reducer: Reducer,
    /// Threshold comparison operator.
    pub threshold_op: ThresholdOp,
    /// Threshold value.
    pub threshold: Threshold,
    /// Notification channel names; may be empty.
    pub channels: Vec<String>,
}

impl DesiredAlertRow {
    /// Creates a row with default reducer, no span matcher and no channels.
    pub fn new(
        rule_type: RuleType,
        entity: impl Into<String>,
        identity_labels: IdentityLabels,
        threshold_op: ThresholdOp,
        threshold: Threshold,
    ) -> Self {
        Self {
            rule_type,
            entity: entity.into(),
            identity_labels,
            span_matcher: None,
            reducer: Reducer::default(),
            threshold_op,
            threshold,
            channels: Vec::new(),
        }
    }

    /// Sets the span matcher.
    #[must_use]
    pub fn with_span_matcher(mut self, pattern: impl Into<String>, op: MatcherOp) -> Self {
        let pattern = pattern.into();
        self.span_matcher = (!pattern.is_empty()).then_some(SpanMatcher { pattern, op });
        self
    }

    /// Sets the reducer.
    #[must_use]
    pub const fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    /// Adds a notification channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }

    /// Returns the condition expression comparing the reduced series.
    #[must_use]
    pub fn condition_expression(&self) -> String {
        format!("$B {} {}", self.threshold_op, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn rule_type_roundtrips_through_key() {
        for t in RuleType::ALL {
            assert_eq!(t.as_str().parse::<RuleType>().expect("known key"), t);
        }
    }

    #[test]
    fn rule_type_unknown_is_configuration_error() {
        let err = "cpu_usage".parse::<RuleType>().unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration { .. }));
    }

    #[test]
    fn rule_type_trigger_types() {
        assert_eq!(RuleType::ErrorRate.trigger_type(), "ErrorRate");
        assert_eq!(RuleType::HttpRequests.trigger_type(), "RequestPerSecond");
        assert_eq!(RuleType::HttpThroughput.trigger_type(), "p50");
        assert_eq!(RuleType::Apdex.trigger_type(), "apdex");
    }

    #[test_case("", MatcherOp::Equal ; "empty defaults to equal")]
    #[test_case("=", MatcherOp::Equal ; "equal")]
    #[test_case("!=", MatcherOp::NotEqual ; "not equal")]
    #[test_case("=~", MatcherOp::Regex ; "regex")]
    #[test_case("!~", MatcherOp::NotRegex ; "negated regex")]
    fn matcher_op_parses(input: &str, expected: MatcherOp) {
        assert_eq!(input.parse::<MatcherOp>().expect("valid op"), expected);
    }

    #[test]
    fn matcher_op_rejects_unknown() {
        assert!("~=".parse::<MatcherOp>().is_err());
    }

    #[test_case(">", ThresholdOp::GreaterThan ; "gt")]
    #[test_case(">=", ThresholdOp::GreaterThanOrEqual ; "gte")]
    #[test_case("<", ThresholdOp::LessThan ; "lt")]
    #[test_case("<=", ThresholdOp::LessThanOrEqual ; "lte")]
    fn threshold_op_symbols(input: &str, expected: ThresholdOp) {
        let op: ThresholdOp = input.parse().expect("valid op");
        assert_eq!(op, expected);
        assert_eq!(op.as_symbol(), input);
    }

    #[test]
    fn reducer_defaults_to_last() {
        assert_eq!("".parse::<Reducer>().expect("empty"), Reducer::Last);
        assert_eq!("mean".parse::<Reducer>().expect("mean"), Reducer::Mean);
        assert!("median".parse::<Reducer>().is_err());
    }

    #[test]
    fn threshold_keeps_literal() {
        let t: Threshold = " 100.0 ".parse().expect("numeric");
        assert_eq!(t.literal(), "100.0");
        assert_eq!(t.to_string(), "100.0");
    }

    #[test_case("abc" ; "not a number")]
    #[test_case("" ; "empty")]
    #[test_case("inf" ; "infinite")]
    fn threshold_rejects(input: &str) {
        assert!(input.parse::<Threshold>().is_err());
    }

    #[test]
    fn identity_labels_parse_in_order() {
        let labels = IdentityLabels::parse("region=us-east;kube_namespace=prod").expect("valid");
        let pairs: Vec<_> = labels.iter().collect();
        assert_eq!(pairs, vec![("region", "us-east"), ("kube_namespace", "prod")]);
        assert_eq!(labels.get("region"), Some("us-east"));
        assert_eq!(labels.get("project"), None);
    }

    #[test]
    fn identity_labels_repeated_key_names_the_key() {
        let err = IdentityLabels::parse("region=a;region=b").unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: identity label 'region' given twice"
        );
    }

    #[test]
    fn identity_labels_value_may_contain_equals() {
        let labels = IdentityLabels::parse("project=a=b").expect("valid");
        assert_eq!(labels.get("project"), Some("a=b"));
    }

    #[test]
    fn identity_labels_empty_string_is_empty() {
        let labels = IdentityLabels::parse("").expect("valid");
        assert!(labels.is_empty());
    }

    #[test_case("region" ; "missing equals")]
    #[test_case("=us-east" ; "empty key")]
    #[test_case("region=us;zone" ; "second segment malformed")]
    #[test_case("region=a;region=b" ; "repeated key")]
    #[test_case("region=a; project=x ;region=a" ; "repeated key with same value")]
    fn identity_labels_malformed(input: &str) {
        let err = IdentityLabels::parse(input).unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration { .. }));
    }

    #[test]
    fn condition_expression_uses_literal() {
        let row = DesiredAlertRow::new(
            RuleType::HttpRequests,
            "checkout",
            IdentityLabels::default(),
            ThresholdOp::GreaterThanOrEqual,
            "0.5".parse().expect("numeric"),
        );
        assert_eq!(row.condition_expression(), "$B >= 0.5");
    }

    #[test]
    fn empty_span_pattern_means_no_matcher() {
        let row = DesiredAlertRow::new(
            RuleType::HttpRequests,
            "checkout",
            IdentityLabels::default(),
            ThresholdOp::GreaterThan,
            "1".parse().expect("numeric"),
        )
        .with_span_matcher("", MatcherOp::Regex);
        assert!(row.span_matcher.is_none());
    }
}
