//! Connection settings for a Grafana server.

use std::time::Duration;

use url::Url;

use crate::error::{GrafanaError, Result};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default user name.
pub const DEFAULT_USERNAME: &str = "admin";

/// Connection settings for a Grafana server.
#[derive(Debug, Clone)]
pub struct GrafanaConfig {
    /// Base URL, including any sub-path Grafana is served under.
    pub base_url: Url,
    /// Basic-auth user name.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// Whether TLS certificates are verified.
    pub verify_tls: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl GrafanaConfig {
    /// Creates a configuration for `address`.
    ///
    /// An address without a scheme is treated as plain `http`.
    pub fn new(address: &str) -> Result<Self> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(GrafanaError::InvalidAddress {
                address: address.to_string(),
                reason: "address cannot be empty".to_string(),
            });
        }
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
        let base_url = Url::parse(&with_scheme).map_err(|e| GrafanaError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(GrafanaError::InvalidAddress {
                address: address.to_string(),
                reason: format!("unsupported scheme '{}'", base_url.scheme()),
            });
        }
        if base_url.cannot_be_a_base() {
            return Err(GrafanaError::InvalidAddress {
                address: address.to_string(),
                reason: "address cannot be used as a base url".to_string(),
            });
        }

        Ok(Self {
            base_url,
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
            verify_tls: true,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Sets the basic-auth credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets whether TLS certificates are verified.
    #[must_use]
    pub const fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
