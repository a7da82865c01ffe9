//! Notification policies routing generated alerts to managed receivers.
//!
//! Every service gets one route per notification channel. A route matches
//! alerts by `service_name`, by the `kfuse_generated="true"` marker and, when
//! the service lists transactions, by `span_name`. All routes of a service
//! except the last one set `continue` so every channel is notified.
//!
//! Routes added by hand in the UI are kept after the generated ones unless
//! they point at a receiver this tool owns.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::contact_points::MANAGED_SUFFIX;
use crate::error::{ReconcileError, Result};
use crate::store::RuleStore;

/// Label every generated rule carries, set to `"true"`.
pub const GENERATED_LABEL: &str = "kfuse_generated";

#[derive(Debug, Deserialize)]
struct RawPolicyFile {
    #[serde(default)]
    clients: Vec<RawClient>,
}

#[derive(Debug, Deserialize)]
struct RawClient {
    #[serde(default)]
    services: Vec<ServicePolicy>,
}

/// Notification channels of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePolicy {
    /// Service the routes match on.
    #[serde(rename = "apm_name")]
    pub service: String,
    /// Receiver names without the managed suffix, in notification order.
    #[serde(default, rename = "notification_channels")]
    pub channels: Vec<String>,
    /// Span names narrowing the routes; empty matches every span.
    #[serde(default, rename = "transactions")]
    pub span_names: Vec<String>,
}

impl ServicePolicy {
    fn matchers(&self) -> Vec<Value> {
        let mut matchers = vec![
            json!(["service_name", "=", self.service]),
            json!([GENERATED_LABEL, "=", "true"]),
        ];
        match self.span_names.as_slice() {
            [] => {}
            [single] => matchers.push(json!(["span_name", "=", single])),
            many => matchers.push(json!(["span_name", "=~", many.join("|")])),
        }
        matchers
    }

    /// Renders the routes of this service, one per channel.
    #[must_use]
    pub fn routes(&self) -> Vec<Value> {
        let last = self.channels.len().saturating_sub(1);
        self.channels
            .iter()
            .enumerate()
            .map(|(idx, channel)| {
                json!({
                    "receiver": format!("{channel}{MANAGED_SUFFIX}"),
                    "object_matchers": self.matchers(),
                    "continue": idx != last,
                })
            })
            .collect()
    }
}

/// Reads service policies from the JSON policy document.
///
/// The document lists `clients`, each with `services` naming an `apm_name`,
/// its `notification_channels` and optional `transactions`.
pub fn read_policies<R: Read>(reader: R) -> Result<Vec<ServicePolicy>> {
    let raw: RawPolicyFile = serde_json::from_reader(reader).map_err(|err| {
        ReconcileError::configuration(format!("invalid notification policy file: {err}"))
    })?;

    let services: Vec<ServicePolicy> = raw.clients.into_iter().flat_map(|c| c.services).collect();
    if let Some(idx) = services.iter().position(|s| s.service.trim().is_empty()) {
        return Err(ReconcileError::configuration(format!(
            "notification policy {}: apm_name cannot be empty",
            idx + 1
        )));
    }
    Ok(services)
}

/// Loads service policies from a JSON file.
pub fn load_policies(path: impl AsRef<Path>) -> Result<Vec<ServicePolicy>> {
    read_policies(fs::File::open(path)?)
}

/// Outcome of merging routes into an alertmanager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPolicyReport {
    /// Receivers of the generated routes, in route order.
    pub managed: Vec<String>,
    /// Routes carried over from the existing configuration.
    pub kept: usize,
}

fn is_script_managed(route: &Value, channels: &[&str]) -> bool {
    route["receiver"]
        .as_str()
        .is_some_and(|r| r.ends_with(MANAGED_SUFFIX) || channels.contains(&r))
}

/// Replaces the routes of an alertmanager configuration document.
///
/// Existing routes pointing at a managed receiver, or at a receiver named
/// like one of the policy channels, are dropped. With `skip_merge` every
/// existing route is dropped.
pub fn merge_routes(
    config: &mut Value,
    policies: &[ServicePolicy],
    skip_merge: bool,
) -> Result<NotificationPolicyReport> {
    let malformed = |reason: &str| ReconcileError::remote("get alertmanager config", reason);
    let am = config
        .get_mut("alertmanager_config")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| malformed("document has no alertmanager_config object"))?;

    let receivers: Vec<String> = am
        .get("receivers")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("no receivers defined; install contact points first"))?
        .iter()
        .filter_map(|r| r["name"].as_str().map(str::to_string))
        .collect();

    let route = am
        .get_mut("route")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| malformed("document has no route object"))?;

    let channels: Vec<&str> = policies
        .iter()
        .flat_map(|p| p.channels.iter().map(String::as_str))
        .collect();
    let mut routes: Vec<Value> = policies.iter().flat_map(ServicePolicy::routes).collect();
    let managed: Vec<String> = routes
        .iter()
        .filter_map(|r| r["receiver"].as_str().map(str::to_string))
        .collect();
    for name in &managed {
        if !receivers.contains(name) {
            warn!(receiver = %name, "route points at a receiver that is not installed");
        }
    }

    let mut kept = 0;
    if !skip_merge {
        let existing = route
            .get("routes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for r in existing {
            if !is_script_managed(&r, &channels) {
                routes.push(r);
                kept += 1;
            }
        }
    }

    route.insert("routes".to_string(), Value::Array(routes));
    Ok(NotificationPolicyReport { managed, kept })
}

/// Installs the routes of `policies` into the remote alertmanager.
pub async fn sync_notification_policies<S: RuleStore>(
    store: &S,
    policies: &[ServicePolicy],
    skip_merge: bool,
) -> Result<NotificationPolicyReport> {
    let mut config = store.get_alertmanager_config().await?;
    let report = merge_routes(&mut config, policies, skip_merge)?;
    debug!(kept = report.kept, skip_merge, "merged routes");
    store.update_alertmanager_config(&config).await?;

    info!(
        managed = report.managed.len(),
        kept = report.kept,
        "updated notification policies"
    );
    Ok(report)
}
