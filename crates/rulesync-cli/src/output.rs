//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::collections::BTreeSet;
use std::io::Write;

use rulesync_core::{ApplyReport, ContactPointReport, GroupKey, NotificationPolicyReport, Plan};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

fn names(keys: &BTreeSet<GroupKey>) -> Vec<String> {
    keys.iter().map(|k| k.as_str().to_string()).collect()
}

/// What a run would change, computed before any mutation.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    /// Managed folder title.
    pub folder: String,
    /// Whether the folder already exists.
    pub folder_exists: bool,
    /// Number of desired groups.
    pub desired_groups: usize,
    /// Number of desired rules across all groups.
    pub desired_rules: usize,
    /// Groups to create.
    pub create: Vec<String>,
    /// Groups to replace.
    pub update: Vec<String>,
    /// Groups to delete.
    pub delete: Vec<String>,
    /// Number of groups already converged.
    pub unchanged: usize,
}

impl PlanSummary {
    /// Summarizes `plan` for the folder titled `folder`.
    #[must_use]
    pub fn from_plan(folder: &str, plan: &Plan) -> Self {
        Self {
            folder: folder.to_string(),
            folder_exists: plan.folder_uid.is_some(),
            desired_groups: plan.desired.len(),
            desired_rules: plan.desired.values().map(|g| g.rules.len()).sum(),
            create: names(&plan.diff.to_create),
            update: names(&plan.diff.to_update),
            delete: names(&plan.diff.to_delete),
            unchanged: plan.diff.unchanged.len(),
        }
    }

    /// Returns true if the plan changes nothing.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

fn write_actions<W: Write>(
    writer: &mut W,
    action: &str,
    groups: &[String],
) -> Result<(), CliError> {
    for group in groups {
        writeln!(writer, "{action:<10} {group}")?;
    }
    Ok(())
}

impl TableDisplay for PlanSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Plan for folder '{}'", self.folder)?;
        writeln!(writer, "══════════════════════════════════")?;
        if !self.folder_exists {
            writeln!(writer, "Folder does not exist and will be created")?;
        }
        writeln!(
            writer,
            "Desired: {} rule(s) in {} group(s)",
            self.desired_rules, self.desired_groups
        )?;
        writeln!(writer)?;

        if self.is_converged() {
            writeln!(writer, "No changes. {} group(s) up to date.", self.unchanged)?;
            return Ok(());
        }

        writeln!(writer, "{:<10} GROUP", "ACTION")?;
        writeln!(writer, "{}", "─".repeat(72))?;
        write_actions(writer, "create", &self.create)?;
        write_actions(writer, "update", &self.update)?;
        write_actions(writer, "delete", &self.delete)?;
        writeln!(writer)?;
        writeln!(
            writer,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create.len(),
            self.update.len(),
            self.delete.len(),
            self.unchanged
        )?;
        Ok(())
    }
}

impl TableDisplay for ApplyReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{:<10} GROUP", "RESULT")?;
        writeln!(writer, "{}", "─".repeat(72))?;
        write_actions(writer, "created", &self.created)?;
        write_actions(writer, "updated", &self.updated)?;
        write_actions(writer, "deleted", &self.deleted)?;
        for failure in &self.failed {
            writeln!(writer, "{:<10} {}: {}", "failed", failure.group, failure.error)?;
        }
        writeln!(writer)?;
        writeln!(
            writer,
            "{} created, {} updated, {} deleted, {} failed",
            self.created.len(),
            self.updated.len(),
            self.deleted.len(),
            self.failed.len()
        )?;
        if let Some(reason) = &self.aborted {
            writeln!(writer, "Aborted: {reason}")?;
        }
        Ok(())
    }
}

/// Plan and outcome of a `sync` run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    /// What the run set out to change.
    pub plan: PlanSummary,
    /// What it actually changed.
    pub report: ApplyReport,
}

impl TableDisplay for SyncSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.plan.is_converged() {
            return self.plan.write_table(writer);
        }
        writeln!(writer, "Sync of folder '{}'", self.plan.folder)?;
        writeln!(writer, "══════════════════════════════════")?;
        self.report.write_table(writer)
    }
}

impl TableDisplay for ContactPointReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "MANAGED RECEIVER")?;
        writeln!(writer, "{}", "─".repeat(72))?;
        for name in &self.managed {
            writeln!(writer, "{name}")?;
        }
        writeln!(writer)?;
        writeln!(
            writer,
            "{} managed receiver(s) installed, {} other receiver(s) kept",
            self.managed.len(),
            self.kept
        )?;
        Ok(())
    }
}

impl TableDisplay for NotificationPolicyReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "ROUTE RECEIVER")?;
        writeln!(writer, "{}", "─".repeat(72))?;
        for name in &self.managed {
            writeln!(writer, "{name}")?;
        }
        writeln!(writer)?;
        writeln!(
            writer,
            "{} route(s) installed, {} existing route(s) kept",
            self.managed.len(),
            self.kept
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> PlanSummary {
        PlanSummary {
            folder: "apm_services_alerts".to_string(),
            folder_exists: true,
            desired_groups: 2,
            desired_rules: 3,
            create: vec!["svc_1m_1".to_string()],
            update: Vec::new(),
            delete: vec!["old_1m_1".to_string()],
            unchanged: 1,
        }
    }

    #[test]
    fn plan_table_lists_actions() {
        let out = OutputFormat::new(Format::Table)
            .to_string(&summary())
            .expect("render");
        assert!(out.contains("Plan for folder 'apm_services_alerts'"));
        assert!(out.contains("create     svc_1m_1"));
        assert!(out.contains("delete     old_1m_1"));
        assert!(out.contains("1 to create, 0 to update, 1 to delete, 1 unchanged"));
    }

    #[test]
    fn converged_plan_says_no_changes() {
        let mut plan = summary();
        plan.create.clear();
        plan.delete.clear();
        let out = OutputFormat::default().to_string(&plan).expect("render");
        assert!(out.contains("No changes. 1 group(s) up to date."));
    }

    #[test]
    fn plan_json_is_parseable() {
        let format = OutputFormat::new(Format::Json);
        assert!(format.is_json());
        let out = format.to_string(&summary()).expect("render");
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value["create"][0], "svc_1m_1");
        assert_eq!(value["folder_exists"], true);
    }

    #[test]
    fn contact_point_table() {
        let report = ContactPointReport {
            kept: 2,
            managed: vec!["oncall__kfuse_script_managed".to_string()],
        };
        let out = OutputFormat::default().to_string(&report).expect("render");
        assert!(out.contains("oncall__kfuse_script_managed"));
        assert!(out.contains("1 managed receiver(s) installed, 2 other receiver(s) kept"));
    }
}
