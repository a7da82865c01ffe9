//! The remote rule store seam.
//!
//! The [`RuleStore`] trait is everything the reconciler needs from the remote
//! alerting service. The HTTP implementation lives in `rulesync-grafana`;
//! [`InMemoryRuleStore`] backs tests and dry runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::error::{ReconcileError, Result};
use crate::existing::ExistingRuleGroup;
use crate::payload::GroupPayload;

/// Operations the reconciler performs against the remote alerting service.
///
/// Calls are awaited one at a time; implementations are never re-entered
/// concurrently within a run.
#[allow(async_fn_in_trait)]
pub trait RuleStore: Send + Sync {
    /// Finds a folder by title, returning its uid.
    fn find_folder(&self, title: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Creates a folder and returns its uid.
    fn create_folder(&self, title: &str) -> impl Future<Output = Result<String>> + Send;

    /// Lists the names of the rule groups installed in a folder.
    fn list_groups(&self, folder_uid: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Fetches one rule group.
    ///
    /// An absent group is returned as an empty group, not an error.
    fn get_group(
        &self,
        folder_uid: &str,
        name: &str,
    ) -> impl Future<Output = Result<ExistingRuleGroup>> + Send;

    /// Replaces a whole rule group.
    fn write_group(
        &self,
        folder_uid: &str,
        group: &GroupPayload,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Deletes a rule group. Deleting an absent group succeeds.
    fn delete_group(&self, folder_uid: &str, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Resolves a datasource name to its uid.
    fn datasource_uid(&self, name: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Fetches the alertmanager configuration document.
    fn get_alertmanager_config(&self) -> impl Future<Output = Result<Value>> + Send;

    /// Replaces the alertmanager configuration document.
    fn update_alertmanager_config(&self, config: &Value)
    -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Default)]
struct InMemoryState {
    folders: Vec<(String, String)>,
    groups: BTreeMap<(String, String), Value>,
    datasources: HashMap<String, String>,
    alertmanager: Value,
    next_uid: u64,
    mutations: Vec<String>,
    failing_groups: HashSet<String>,
    unreadable_groups: HashSet<String>,
    offline: bool,
}

impl InMemoryState {
    fn next_uid(&mut self, prefix: &str) -> String {
        self.next_uid += 1;
        format!("{prefix}-{}", self.next_uid)
    }

    fn check_online(&self, operation: &str) -> Result<()> {
        if self.offline {
            return Err(ReconcileError::transport(operation, "connection refused"));
        }
        Ok(())
    }
}

/// A [`RuleStore`] held in memory.
///
/// Written rules are assigned a uid the way the remote service does, so
/// round trips through this store look like round trips through the real one.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryRuleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a datasource.
    #[must_use]
    pub fn with_datasource(self, name: impl Into<String>, uid: impl Into<String>) -> Self {
        self.state.lock().datasources.insert(name.into(), uid.into());
        self
    }

    /// Sets the alertmanager configuration document.
    #[must_use]
    pub fn with_alertmanager_config(self, config: Value) -> Self {
        self.state.lock().alertmanager = config;
        self
    }

    /// Installs a group directly, creating the folder if needed.
    pub fn insert_group(&self, folder_title: &str, group: Value) {
        let mut state = self.state.lock();
        let existing = state
            .folders
            .iter()
            .find(|(_, t)| t == folder_title)
            .map(|(uid, _)| uid.clone());
        let uid = match existing {
            Some(uid) => uid,
            None => {
                let uid = state.next_uid("folder");
                state.folders.push((uid.clone(), folder_title.to_string()));
                uid
            }
        };
        let name = group["name"].as_str().unwrap_or_default().to_string();
        state.groups.insert((uid, name), group);
    }

    /// Returns the raw payload of a group, looked up by folder title.
    #[must_use]
    pub fn group(&self, folder_title: &str, name: &str) -> Option<Value> {
        let state = self.state.lock();
        let (uid, _) = state.folders.iter().find(|(_, t)| t == folder_title)?;
        state.groups.get(&(uid.clone(), name.to_string())).cloned()
    }

    /// Returns the names of every group in a folder, looked up by title.
    #[must_use]
    pub fn group_names(&self, folder_title: &str) -> Vec<String> {
        let state = self.state.lock();
        let Some((uid, _)) = state.folders.iter().find(|(_, t)| t == folder_title) else {
            return Vec::new();
        };
        state
            .groups
            .keys()
            .filter(|(f, _)| f == uid)
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Returns the current alertmanager configuration document.
    #[must_use]
    pub fn alertmanager_config(&self) -> Value {
        self.state.lock().alertmanager.clone()
    }

    /// Returns every mutation issued so far, e.g. `write checkout_..`.
    #[must_use]
    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().mutations.clone()
    }

    /// Makes every write or delete of `group` fail with a remote error.
    pub fn fail_group(&self, group: impl Into<String>) {
        self.state.lock().failing_groups.insert(group.into());
    }

    /// Makes every read of `group` fail with a remote error.
    pub fn fail_read(&self, group: impl Into<String>) {
        self.state.lock().unreadable_groups.insert(group.into());
    }

    /// Makes every call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }
}

impl RuleStore for InMemoryRuleStore {
    async fn find_folder(&self, title: &str) -> Result<Option<String>> {
        let state = self.state.lock();
        state.check_online("list folders")?;
        Ok(state
            .folders
            .iter()
            .find(|(_, t)| t == title)
            .map(|(uid, _)| uid.clone()))
    }

    async fn create_folder(&self, title: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.check_online("create folder")?;
        let uid = state.next_uid("folder");
        state.folders.push((uid.clone(), title.to_string()));
        state.mutations.push(format!("create folder {title}"));
        Ok(uid)
    }

    async fn list_groups(&self, folder_uid: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        state.check_online("list groups")?;
        Ok(state
            .groups
            .keys()
            .filter(|(f, _)| f == folder_uid)
            .map(|(_, n)| n.clone())
            .collect())
    }

    async fn get_group(&self, folder_uid: &str, name: &str) -> Result<ExistingRuleGroup> {
        let state = self.state.lock();
        state.check_online("get group")?;
        if state.unreadable_groups.contains(name) {
            return Err(ReconcileError::remote(format!("get group {name}"), "http 500"));
        }
        Ok(state
            .groups
            .get(&(folder_uid.to_string(), name.to_string()))
            .map_or_else(
                || ExistingRuleGroup::empty(name),
                |raw| ExistingRuleGroup::from_value(name, raw),
            ))
    }

    async fn write_group(&self, folder_uid: &str, group: &GroupPayload) -> Result<()> {
        let mut state = self.state.lock();
        state.check_online("write group")?;
        if state.failing_groups.contains(&group.name) {
            return Err(ReconcileError::remote(
                format!("write group {}", group.name),
                "http 500",
            ));
        }
        if !state.folders.iter().any(|(uid, _)| uid == folder_uid) {
            return Err(ReconcileError::remote(
                format!("write group {}", group.name),
                format!("folder {folder_uid} not found"),
            ));
        }

        let mut rules = group.rules.clone();
        for rule in &mut rules {
            let Some(alert) = rule
                .get_mut("grafana_alert")
                .and_then(Value::as_object_mut)
            else {
                continue;
            };
            if !alert.contains_key("uid") {
                state.next_uid += 1;
                alert.insert("uid".to_string(), json!(format!("rule-{}", state.next_uid)));
            }
        }

        let stored = json!({
            "name": group.name,
            "interval": group.interval,
            "rules": rules,
        });
        state
            .groups
            .insert((folder_uid.to_string(), group.name.clone()), stored);
        state.mutations.push(format!("write {}", group.name));
        Ok(())
    }

    async fn delete_group(&self, folder_uid: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.check_online("delete group")?;
        if state.failing_groups.contains(name) {
            return Err(ReconcileError::remote(format!("delete group {name}"), "http 500"));
        }
        state
            .groups
            .remove(&(folder_uid.to_string(), name.to_string()));
        state.mutations.push(format!("delete {name}"));
        Ok(())
    }

    async fn datasource_uid(&self, name: &str) -> Result<Option<String>> {
        let state = self.state.lock();
        state.check_online("list datasources")?;
        Ok(state.datasources.get(name).cloned())
    }

    async fn get_alertmanager_config(&self) -> Result<Value> {
        let state = self.state.lock();
        state.check_online("get alertmanager config")?;
        Ok(state.alertmanager.clone())
    }

    async fn update_alertmanager_config(&self, config: &Value) -> Result<()> {
        let mut state = self.state.lock();
        state.check_online("update alertmanager config")?;
        state.alertmanager = config.clone();
        state.mutations.push("update alertmanager config".to_string());
        Ok(())
    }
}
