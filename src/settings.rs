//! Layered runtime settings.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config`)
//! 3. Environment variables prefixed `TELEWATCH_`, with `__` between levels
//!    (e.g. `TELEWATCH_UPSTREAM__BASE_URL`)
//! 4. Command-line flags
//!
//! ```toml
//! log_level = "info"
//!
//! [upstream]
//! base_url = "http://localhost:8090"
//! request_timeout = "5s"
//! path_style = "upstream"   # or "proxy" to poll through a telewatch proxy
//!
//! [current]
//! interval = "1s"
//!
//! [anomaly]
//! interval = "2s"
//! window = "5s"
//! retention = "10s"
//!
//! [proxy]
//! listen_addr = "127.0.0.1:3000"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use telewatch_poller::{
    AnomalyEvent, AnomalyWindowPoller, ConfigError, CurrentValuePoller, PathStyle,
    TelemetrySource, UpstreamClient,
};
use telewatch_proxy::ProxyConfig;
use tokio::sync::mpsc;

use crate::data::duration::parse_duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TELEWATCH";

/// Fully resolved settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub log_level: String,
    pub upstream: UpstreamSettings,
    pub current: CurrentSettings,
    pub anomaly: AnomalySettings,
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    /// Base URL of the telemetry API. Empty means unset.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(deserialize_with = "duration")]
    pub request_timeout: Duration,
    /// `upstream` for the telemetry service itself, `proxy` for a telewatch proxy.
    #[serde(deserialize_with = "path_style")]
    pub path_style: PathStyle,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentSettings {
    #[serde(deserialize_with = "duration")]
    pub interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalySettings {
    #[serde(deserialize_with = "duration")]
    pub interval: Duration,
    #[serde(deserialize_with = "duration")]
    pub window: Duration,
    /// How long delivered keys are remembered. Twice the window when unset.
    #[serde(default, deserialize_with = "optional_duration")]
    pub retention: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    pub listen_addr: String,
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub log_level: Option<String>,
    pub current_interval: Option<String>,
    pub anomaly_interval: Option<String>,
    pub anomaly_window: Option<String>,
    pub listen_addr: Option<String>,
}

impl Settings {
    /// Load settings from defaults, `config_file`, the process environment and
    /// `overrides`.
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        Self::load_with_env(config_file, overrides, None)
    }

    /// Like [`Settings::load`], reading environment variables from `env`
    /// instead of the process environment when given.
    pub fn load_with_env(
        config_file: Option<&Path>,
        overrides: &Overrides,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("log_level", "info")?
            .set_default("upstream.base_url", "http://localhost:8090")?
            .set_default("upstream.request_timeout", "5s")?
            .set_default("upstream.path_style", "upstream")?
            .set_default("current.interval", "1s")?
            .set_default("anomaly.interval", "2s")?
            .set_default("anomaly.window", "5s")?
            .set_default("proxy.listen_addr", "127.0.0.1:3000")?;

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(env),
        );

        let config = builder
            .set_override_option("upstream.base_url", overrides.base_url.clone())?
            .set_override_option("log_level", overrides.log_level.clone())?
            .set_override_option("current.interval", overrides.current_interval.clone())?
            .set_override_option("anomaly.interval", overrides.anomaly_interval.clone())?
            .set_override_option("anomaly.window", overrides.anomaly_window.clone())?
            .set_override_option("proxy.listen_addr", overrides.listen_addr.clone())?
            .build()
            .context("Failed to load settings")?;

        let mut settings: Settings = config
            .try_deserialize()
            .context("Invalid settings")?;
        settings.upstream.base_url = settings
            .upstream
            .base_url
            .take()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        Ok(settings)
    }

    /// Build the HTTP client for the configured upstream.
    pub fn upstream_client(&self) -> Result<UpstreamClient, ConfigError> {
        let mut builder = UpstreamClient::builder()
            .timeout(self.upstream.request_timeout)
            .path_style(self.upstream.path_style);
        if let Some(base_url) = &self.upstream.base_url {
            builder = builder.base_url(base_url.clone());
        }
        builder.build()
    }

    /// Build the current-value poller.
    pub fn current_poller(
        &self,
        source: Arc<dyn TelemetrySource>,
    ) -> Result<CurrentValuePoller, ConfigError> {
        CurrentValuePoller::new(source)
            .with_interval(self.current.interval)?
            .with_request_timeout(self.upstream.request_timeout)
    }

    /// Build the anomaly poller, validating window, interval and retention.
    pub fn anomaly_poller(
        &self,
        source: Arc<dyn TelemetrySource>,
        sink: mpsc::Sender<AnomalyEvent>,
    ) -> Result<AnomalyWindowPoller, ConfigError> {
        let mut builder = AnomalyWindowPoller::builder(source)
            .interval(self.anomaly.interval)
            .window(self.anomaly.window)
            .request_timeout(self.upstream.request_timeout);
        if let Some(retention) = self.anomaly.retention {
            builder = builder.retention(retention);
        }
        builder.build(sink)
    }

    /// Proxy configuration. The proxy forwards to the same upstream.
    pub fn proxy_config(&self) -> ProxyConfig {
        let mut builder = ProxyConfig::builder()
            .listen_addr(self.proxy.listen_addr.clone())
            .request_timeout(self.upstream.request_timeout);
        if let Some(base_url) = &self.upstream.base_url {
            builder = builder.upstream_base_url(base_url.clone());
        }
        builder.build()
    }
}

fn duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn path_style<'de, D>(deserializer: D) -> std::result::Result<PathStyle, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn optional_duration<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}
