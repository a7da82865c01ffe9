//! Reconciliation configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

/// Default title of the folder that holds every managed rule group.
pub const DEFAULT_FOLDER: &str = "apm_services_alerts";

/// Default name of the metrics datasource the rules query.
pub const DEFAULT_DATASOURCE: &str = "KfuseDatasource";

/// Default label stamped on every managed rule for notification routing.
pub const DEFAULT_ROUTING_LABEL: &str = "kfuse_generated";

/// The fixed, versioned set of labels that identify an entity.
///
/// Changing the label list changes the hash of every entity, so a new list
/// must ship as a new version rather than as an edit of an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLabelSet {
    version: u32,
    entity_label: String,
    labels: Vec<String>,
}

impl IdentityLabelSet {
    /// Version 1: the service-scoped label set.
    #[must_use]
    pub fn v1() -> Self {
        let labels = [
            "availability_zone",
            "cloud_account_id",
            "kf_platform",
            "kube_cluster_name",
            "kube_namespace",
            "project",
            "region",
            "service_name",
        ];
        Self {
            version: 1,
            entity_label: "service_name".to_string(),
            labels: labels.iter().map(ToString::to_string).collect(),
        }
    }

    /// Creates a custom label set.
    ///
    /// Labels are sorted and deduplicated. The entity label must be a member.
    pub fn new(
        version: u32,
        entity_label: impl Into<String>,
        labels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let entity_label = entity_label.into();
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();
        if !labels.contains(&entity_label) {
            return Err(ReconcileError::configuration(format!(
                "entity label '{entity_label}' is not part of identity label set v{version}"
            )));
        }
        Ok(Self {
            version,
            entity_label,
            labels,
        })
    }

    /// Returns the set version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the label naming the entity itself.
    #[must_use]
    pub fn entity_label(&self) -> &str {
        &self.entity_label
    }

    /// Returns the labels in lexicographic order.
    #[must_use]
    pub fn sorted_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.labels.iter().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }

    /// Returns true if the label participates in identity.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

impl Default for IdentityLabelSet {
    fn default() -> Self {
        Self::v1()
    }
}

/// Configuration for one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Title of the folder holding the managed groups.
    pub folder: String,
    /// Name of the datasource the query stage reads from.
    pub datasource: String,
    /// Window segment of the group key.
    pub window: String,
    /// Shard segment of the group key.
    pub shard: u32,
    /// Evaluation interval of each group.
    pub interval: String,
    /// How long a condition must hold before the rule fires.
    pub pending_for: String,
    /// Label set to `"true"` on every managed rule.
    pub routing_label: String,
    /// Labels that identify an entity.
    pub identity: IdentityLabelSet,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            folder: DEFAULT_FOLDER.to_string(),
            datasource: DEFAULT_DATASOURCE.to_string(),
            window: "1m".to_string(),
            shard: 1,
            interval: "1m".to_string(),
            pending_for: "0s".to_string(),
            routing_label: DEFAULT_ROUTING_LABEL.to_string(),
            identity: IdentityLabelSet::v1(),
        }
    }
}

impl ReconcileConfig {
    /// Sets the managed folder title.
    #[must_use]
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Sets the datasource name.
    #[must_use]
    pub fn with_datasource(mut self, datasource: impl Into<String>) -> Self {
        self.datasource = datasource.into();
        self
    }

    /// Sets the evaluation interval, which is also the group-key window.
    #[must_use]
    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        let interval = interval.into();
        self.window.clone_from(&interval);
        self.interval = interval;
        self
    }

    /// Sets the pending duration.
    #[must_use]
    pub fn with_pending_for(mut self, pending_for: impl Into<String>) -> Self {
        self.pending_for = pending_for.into();
        self
    }

    /// Sets the routing marker label.
    #[must_use]
    pub fn with_routing_label(mut self, label: impl Into<String>) -> Self {
        self.routing_label = label.into();
        self
    }

    /// Sets the identity label set.
    #[must_use]
    pub fn with_identity(mut self, identity: IdentityLabelSet) -> Self {
        self.identity = identity;
        self
    }

    /// Checks the values that would otherwise fail later against the remote.
    pub fn validate(&self) -> Result<()> {
        if self.folder.trim().is_empty() {
            return Err(ReconcileError::configuration("folder title cannot be empty"));
        }
        if self.datasource.trim().is_empty() {
            return Err(ReconcileError::configuration("datasource name cannot be empty"));
        }
        if self.routing_label.trim().is_empty() {
            return Err(ReconcileError::configuration("routing label cannot be empty"));
        }
        parse_duration_ms(&self.interval)?;
        parse_duration_ms(&self.pending_for)?;
        Ok(())
    }
}

/// Parses a duration such as `1m`, `90s` or `1h30m` into milliseconds.
pub fn parse_duration_ms(input: &str) -> Result<u64> {
    let invalid = |reason: String| {
        ReconcileError::configuration(format!("invalid duration '{input}': {reason}"))
    };
    let duration = humantime::parse_duration(input.trim()).map_err(|e| invalid(e.to_string()))?;
    u64::try_from(duration.as_millis()).map_err(|_| invalid("out of range".to_string()))
}
