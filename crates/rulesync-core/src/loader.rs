//! Desired-state table loading.
//!
//! The table is a CSV file with a header row:
//!
//! ```text
//! apm_trigger,service_name,service_id_labels,span_name_pattern,span_name_matcher_op,reducer,threshold_operator,threshold_value,contact_points
//! http_requests,checkout,region=us-east;kube_namespace=prod,,,,>,100,slack-oncall
//! ```
//!
//! Errors name the 1-based data row they were found on.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ReconcileError, Result};
use crate::types::{DesiredAlertRow, IdentityLabels, MatcherOp, Reducer};

#[derive(Debug, Deserialize)]
struct RawRow {
    apm_trigger: String,
    service_name: String,
    #[serde(default)]
    service_id_labels: String,
    #[serde(default)]
    span_name_pattern: String,
    #[serde(default)]
    span_name_matcher_op: String,
    #[serde(default)]
    reducer: String,
    threshold_operator: String,
    threshold_value: String,
    #[serde(default)]
    contact_points: String,
}

impl RawRow {
    fn into_row(self) -> Result<DesiredAlertRow> {
        let entity = self.service_name.trim();
        if entity.is_empty() {
            return Err(ReconcileError::configuration("service_name cannot be empty"));
        }
        let op: MatcherOp = self.span_name_matcher_op.parse()?;
        let reducer: Reducer = self.reducer.parse()?;

        let mut row = DesiredAlertRow::new(
            self.apm_trigger.parse()?,
            entity,
            IdentityLabels::parse(&self.service_id_labels)?,
            self.threshold_operator.parse()?,
            self.threshold_value.parse()?,
        )
        .with_span_matcher(self.span_name_pattern.trim(), op)
        .with_reducer(reducer);

        for channel in self
            .contact_points
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            row = row.with_channel(channel);
        }
        Ok(row)
    }
}

/// Reads the desired-state table from `reader`.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<DesiredAlertRow>> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, record) in csv.deserialize::<RawRow>().enumerate() {
        let line = idx + 1;
        let raw = record.map_err(|err| {
            ReconcileError::configuration(format!("row {line}: {err}"))
        })?;
        let row = raw.into_row().map_err(|err| match err {
            ReconcileError::Configuration { reason } => {
                ReconcileError::configuration(format!("row {line}: {reason}"))
            }
            other => other,
        })?;
        rows.push(row);
    }
    debug!(rows = rows.len(), "loaded desired-state table");
    Ok(rows)
}

/// Loads the desired-state table from a file.
pub fn load_rows(path: impl AsRef<Path>) -> Result<Vec<DesiredAlertRow>> {
    let file = File::open(path.as_ref())?;
    read_rows(file)
}
