//! Managed notification receivers.
//!
//! Receivers created by this tool carry [`MANAGED_SUFFIX`] in their name.
//! Syncing replaces every suffixed receiver in the alertmanager configuration
//! with the loaded set and leaves all other receivers alone.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{ReconcileError, Result};
use crate::store::RuleStore;

/// Name suffix marking receivers owned by this tool.
pub const MANAGED_SUFFIX: &str = "__kfuse_script_managed";

#[derive(Debug, Deserialize)]
struct RawContactPoint {
    #[serde(rename = "type")]
    kind: String,
    contact_point_name: String,
    receiver: String,
    #[serde(default)]
    template_title_file: String,
    #[serde(default)]
    template_body_file: String,
}

/// One notification receiver to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactPoint {
    /// Integration type, e.g. `slack` or `email`.
    pub kind: String,
    /// Name without the managed suffix.
    pub name: String,
    /// Integration target: webhook URL, address list or key.
    pub receiver: String,
    /// Notification title template.
    pub title_template: String,
    /// Notification body template.
    pub body_template: String,
}

impl ContactPoint {
    /// Returns the receiver name as installed remotely.
    #[must_use]
    pub fn managed_name(&self) -> String {
        format!("{}{MANAGED_SUFFIX}", self.name)
    }

    /// Returns the settings key the integration reads its target from.
    #[must_use]
    pub fn target_key(&self) -> &'static str {
        match self.kind.as_str() {
            "email" => "addresses",
            "pagerduty" => "integrationKey",
            "opsgenie" => "apiKey",
            "slack" if !self.receiver.starts_with("http") => "recipient",
            _ => "url",
        }
    }

    /// Renders the alertmanager receiver object.
    #[must_use]
    pub fn to_receiver(&self) -> Value {
        let name = self.managed_name();
        let mut settings = serde_json::Map::new();
        settings.insert(self.target_key().to_string(), json!(self.receiver));
        if !self.title_template.is_empty() {
            settings.insert("title".to_string(), json!(self.title_template));
        }
        if !self.body_template.is_empty() {
            settings.insert("text".to_string(), json!(self.body_template));
        }
        json!({
            "name": name,
            "grafana_managed_receiver_configs": [{
                "name": name,
                "type": self.kind,
                "disableResolveMessage": false,
                "settings": settings,
            }],
        })
    }
}

/// Reads contact points from CSV.
///
/// Template file names are resolved against `template_dir`. A later row with
/// the same name replaces an earlier one.
pub fn read_contact_points<R: Read>(reader: R, template_dir: &Path) -> Result<Vec<ContactPoint>> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut points: Vec<ContactPoint> = Vec::new();
    for (idx, record) in csv.deserialize::<RawContactPoint>().enumerate() {
        let raw = record?;
        if raw.contact_point_name.is_empty() {
            return Err(ReconcileError::configuration(format!(
                "contact point row {}: name cannot be empty",
                idx + 1
            )));
        }
        let point = ContactPoint {
            title_template: read_template(template_dir, &raw.template_title_file)?,
            body_template: read_template(template_dir, &raw.template_body_file)?,
            kind: raw.kind,
            name: raw.contact_point_name,
            receiver: raw.receiver,
        };
        match points.iter_mut().find(|p| p.name == point.name) {
            Some(existing) => *existing = point,
            None => points.push(point),
        }
    }
    Ok(points)
}

/// Loads contact points from a CSV file; templates resolve next to it.
pub fn load_contact_points(path: impl AsRef<Path>) -> Result<Vec<ContactPoint>> {
    let path = path.as_ref();
    let dir = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
    read_contact_points(fs::File::open(path)?, &dir)
}

fn read_template(dir: &Path, file: &str) -> Result<String> {
    if file.is_empty() {
        return Ok(String::new());
    }
    let path = dir.join(file);
    fs::read_to_string(&path).map_err(|err| {
        ReconcileError::configuration(format!(
            "cannot read template {}: {err}",
            path.display()
        ))
    })
}

/// Replaces the managed receivers of an alertmanager configuration document.
///
/// Returns the number of unmanaged receivers kept.
pub fn merge_receivers(config: &mut Value, points: &[ContactPoint]) -> Result<usize> {
    let receivers = config
        .get_mut("alertmanager_config")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            ReconcileError::remote(
                "get alertmanager config",
                "document has no alertmanager_config object",
            )
        })?
        .entry("receivers")
        .or_insert_with(|| Value::Array(Vec::new()));

    let existing = receivers.as_array().cloned().unwrap_or_default();
    let mut merged: Vec<Value> = existing
        .into_iter()
        .filter(|r| {
            !r["name"]
                .as_str()
                .is_some_and(|name| name.ends_with(MANAGED_SUFFIX))
        })
        .collect();
    let kept = merged.len();
    merged.extend(points.iter().map(ContactPoint::to_receiver));
    *receivers = Value::Array(merged);
    Ok(kept)
}

/// Outcome of a contact-point sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactPointReport {
    /// Receivers left untouched.
    pub kept: usize,
    /// Managed receiver names now installed.
    pub managed: Vec<String>,
}

/// Installs `points` as the managed receivers of the remote alertmanager.
pub async fn sync_contact_points<S: RuleStore>(
    store: &S,
    points: &[ContactPoint],
) -> Result<ContactPointReport> {
    let mut config = store.get_alertmanager_config().await?;
    let kept = merge_receivers(&mut config, points)?;
    debug!(kept, managed = points.len(), "merged receivers");
    store.update_alertmanager_config(&config).await?;

    let managed: Vec<String> = points.iter().map(ContactPoint::managed_name).collect();
    info!(kept, managed = managed.len(), "updated contact points");
    Ok(ContactPointReport { kept, managed })
}
