//! HTTP implementation of [`TelemetrySource`].
//!
//! Talks either to the telemetry service directly or to the local proxy, which
//! serves the same feeds under different paths.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use telewatch_poller::{TelemetrySource, UpstreamClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = UpstreamClient::builder()
//!         .base_url("http://localhost:8090")
//!         .timeout(Duration::from_secs(5))
//!         .build()?;
//!
//!     if let Some(raw) = client.latest().await? {
//!         println!("{raw}");
//!     }
//!     Ok(())
//! }
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use telewatch_types::{Endpoint, QueryRange};
use tracing::trace;

use crate::error::{ConfigError, FetchError};
use crate::source::TelemetrySource;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Which path layout the base URL serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathStyle {
    /// The telemetry service itself (`/api/v1/telemetry/...`).
    #[default]
    Upstream,
    /// The local proxy (`/api/telemetry/...`).
    Proxy,
}

impl FromStr for PathStyle {
    type Err = ConfigError;

    /// Parse `"upstream"` or `"proxy"`, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upstream" => Ok(PathStyle::Upstream),
            "proxy" => Ok(PathStyle::Proxy),
            other => Err(ConfigError::UnknownPathStyle(other.to_string())),
        }
    }
}

impl PathStyle {
    fn path(self, endpoint: Endpoint) -> &'static str {
        match self {
            PathStyle::Upstream => endpoint.upstream_path(),
            PathStyle::Proxy => endpoint.proxy_path(),
        }
    }
}

/// HTTP client for the telemetry API.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: Url,
    style: PathStyle,
}

impl UpstreamClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> UpstreamClientBuilder {
        UpstreamClientBuilder::default()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn path_style(&self) -> PathStyle {
        self.style
    }

    /// Aggregated min/max/avg over `range`, as raw JSON.
    pub async fn aggregation(&self, range: QueryRange) -> Result<Option<Value>, FetchError> {
        self.get(Endpoint::Aggregation, Some(range)).await
    }

    fn url(&self, endpoint: Endpoint) -> Result<Url, FetchError> {
        self.base_url
            .join(self.style.path(endpoint))
            .map_err(|e| FetchError::Http(e.to_string()))
    }

    /// GET one endpoint. `Ok(None)` means the upstream had nothing (204).
    async fn get(
        &self,
        endpoint: Endpoint,
        range: Option<QueryRange>,
    ) -> Result<Option<Value>, FetchError> {
        let url = self.url(endpoint)?;
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.query(&range.query_pairs());
        }

        let response = request.send().await?;
        let status = response.status();
        trace!(?endpoint, %status, "Upstream responded");

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        Ok(match value {
            Value::Null => None,
            value => Some(value),
        })
    }
}

/// A JSON array body, treating an absent or `null` body as empty.
fn into_array(value: Option<Value>) -> Result<Vec<Value>, FetchError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(FetchError::Parse(format!(
            "expected a JSON array, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl TelemetrySource for UpstreamClient {
    async fn latest(&self) -> Result<Option<Value>, FetchError> {
        self.get(Endpoint::Current, None).await
    }

    async fn packets(&self, range: QueryRange) -> Result<Vec<Value>, FetchError> {
        into_array(self.get(Endpoint::Packets, Some(range)).await?)
    }

    async fn anomalies(&self, range: QueryRange) -> Result<Vec<Value>, FetchError> {
        into_array(self.get(Endpoint::Anomalies, Some(range)).await?)
    }
}

/// Builder for UpstreamClient.
#[derive(Debug, Default)]
pub struct UpstreamClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    style: PathStyle,
}

impl UpstreamClientBuilder {
    /// Set the base URL (e.g., "http://localhost:8090").
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the per-request timeout. Defaults to 5 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set which path layout the base URL serves.
    pub fn path_style(mut self, style: PathStyle) -> Self {
        self.style = style;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<UpstreamClient, ConfigError> {
        let raw = self
            .base_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::InvalidBaseUrl("base URL is not set".to_string()))?;
        let base_url =
            Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidBaseUrl(format!("{raw}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl(format!(
                "{raw}: scheme must be http or https"
            )));
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(UpstreamClient {
            client,
            base_url,
            style: self.style,
        })
    }
}
