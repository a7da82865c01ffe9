//! Grafana backend for `rulesync`.
//!
//! [`GrafanaClient`] implements [`rulesync_core::RuleStore`] on top of the
//! Grafana HTTP API:
//!
//! - `GET/POST /api/folders`
//! - `GET/POST/DELETE /api/ruler/grafana/api/v1/rules/{folder}[/{group}]`
//! - `GET /api/datasources`
//! - `GET/POST /api/alertmanager/grafana/config/api/v1/alerts`
//!
//! Connection failures and timeouts surface as transport errors; any non-2xx
//! response surfaces as a remote-state error carrying the status and body.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;

pub use client::GrafanaClient;
pub use config::{DEFAULT_TIMEOUT, DEFAULT_USERNAME, GrafanaConfig};
pub use error::{GrafanaError, Result};
