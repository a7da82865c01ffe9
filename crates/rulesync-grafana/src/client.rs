//! HTTP client for the Grafana folder, ruler, datasource and alertmanager APIs.

use std::fmt;

use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use rulesync_core::{ExistingRuleGroup, GroupPayload, ReconcileError, Result, RuleStore};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::config::GrafanaConfig;

const RULER_PREFIX: [&str; 6] = ["api", "ruler", "grafana", "api", "v1", "rules"];
const ALERTMANAGER_CONFIG: [&str; 7] =
    ["api", "alertmanager", "grafana", "config", "api", "v1", "alerts"];

#[derive(Debug, Deserialize)]
struct FolderEntry {
    uid: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct DatasourceEntry {
    uid: String,
    name: String,
}

/// A [`RuleStore`] backed by the Grafana HTTP API.
#[derive(Clone)]
pub struct GrafanaClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
}

impl fmt::Debug for GrafanaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrafanaClient")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl GrafanaClient {
    /// Creates a client from `config`.
    pub fn new(config: GrafanaConfig) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url,
            username: config.username,
            password: config.password,
        })
    }

    /// Returns the base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                ReconcileError::configuration(format!(
                    "server address '{}' cannot carry a path",
                    self.base_url
                ))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn ruler(&self, tail: &[&str]) -> Result<Url> {
        let segments: Vec<&str> = RULER_PREFIX.iter().chain(tail).copied().collect();
        self.endpoint(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(method = %method, url = %url, "grafana request");
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, "application/json")
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| ReconcileError::transport(operation, e.to_string()))
    }

    async fn check(operation: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ReconcileError::remote(
            operation,
            format!("http {}: {}", status.as_u16(), body.trim()),
        ))
    }

    async fn decode<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| ReconcileError::remote(operation, format!("invalid response body: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &str, url: Url) -> Result<T> {
        let response = self.send(operation, self.request(Method::GET, url)).await?;
        let response = Self::check(operation, response).await?;
        Self::decode(operation, response).await
    }
}

impl RuleStore for GrafanaClient {
    async fn find_folder(&self, title: &str) -> Result<Option<String>> {
        let url = self.endpoint(&["api", "folders"])?;
        let folders: Vec<FolderEntry> = self.get_json("list folders", url).await?;
        Ok(folders.into_iter().find(|f| f.title == title).map(|f| f.uid))
    }

    async fn create_folder(&self, title: &str) -> Result<String> {
        let operation = format!("create folder {title}");
        let url = self.endpoint(&["api", "folders"])?;
        let request = self.request(Method::POST, url).json(&json!({ "title": title }));
        let response = Self::check(&operation, self.send(&operation, request).await?).await?;
        let folder: FolderEntry = Self::decode(&operation, response).await?;
        Ok(folder.uid)
    }

    async fn list_groups(&self, folder_uid: &str) -> Result<Vec<String>> {
        let url = self.ruler(&[folder_uid])?;
        let by_folder: Value = self.get_json("list rule groups", url).await?;
        let mut names = Vec::new();
        if let Some(folders) = by_folder.as_object() {
            for groups in folders.values().filter_map(Value::as_array) {
                names.extend(
                    groups
                        .iter()
                        .filter_map(|g| g["name"].as_str())
                        .map(str::to_string),
                );
            }
        }
        Ok(names)
    }

    async fn get_group(&self, folder_uid: &str, name: &str) -> Result<ExistingRuleGroup> {
        let operation = format!("get group {name}");
        let url = self.ruler(&[folder_uid, name])?;
        let response = self.send(&operation, self.request(Method::GET, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(ExistingRuleGroup::empty(name));
        }
        let response = Self::check(&operation, response).await?;
        let raw: Value = Self::decode(&operation, response).await?;
        Ok(ExistingRuleGroup::from_value(name, &raw))
    }

    async fn write_group(&self, folder_uid: &str, group: &GroupPayload) -> Result<()> {
        let operation = format!("write group {}", group.name);
        let url = self.ruler(&[folder_uid])?;
        let request = self.request(Method::POST, url).json(group);
        Self::check(&operation, self.send(&operation, request).await?).await?;
        Ok(())
    }

    async fn delete_group(&self, folder_uid: &str, name: &str) -> Result<()> {
        let operation = format!("delete group {name}");
        let url = self.ruler(&[folder_uid, name])?;
        let response = self.send(&operation, self.request(Method::DELETE, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(group = %name, "group already absent");
            return Ok(());
        }
        Self::check(&operation, response).await?;
        Ok(())
    }

    async fn datasource_uid(&self, name: &str) -> Result<Option<String>> {
        let url = self.endpoint(&["api", "datasources"])?;
        let datasources: Vec<DatasourceEntry> = self.get_json("list datasources", url).await?;
        Ok(datasources
            .into_iter()
            .find(|d| d.name == name)
            .map(|d| d.uid))
    }

    async fn get_alertmanager_config(&self) -> Result<Value> {
        let url = self.endpoint(&ALERTMANAGER_CONFIG)?;
        self.get_json("get alertmanager config", url).await
    }

    async fn update_alertmanager_config(&self, config: &Value) -> Result<()> {
        let operation = "update alertmanager config";
        let url = self.endpoint(&ALERTMANAGER_CONFIG)?;
        let request = self.request(Method::POST, url).json(config);
        Self::check(operation, self.send(operation, request).await?).await?;
        Ok(())
    }
}
