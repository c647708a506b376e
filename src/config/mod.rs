//! Configuration Management
//!
//! Loads host configuration from TOML files.
//! Configuration includes:
//! - HTTP transport timeouts
//! - Polling, retry and metrics timing of the REST client
//! - Readiness detection (log marker, timeout)
//! - Container image coordinates
//! - Declared mock-server resources and their artifacts (used by the CLI)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::errors::MicrocksError;

pub const DEFAULT_URL: &str = "http://localhost:8080";
pub const DEFAULT_READY_MARKER: &str = "Started MicrocksApplication";

/// Whether the host is running the application or only publishing a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Containers are started and artifacts synchronised (default)
    #[default]
    Run,
    /// Only a deployment manifest is produced; nothing runs
    Publish,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Run => write!(f, "run"),
            ExecutionMode::Publish => write!(f, "publish"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of an already running Microcks server
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub readiness: ReadinessConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub resources: Vec<ResourceConfig>,

    /// Runtime execution mode (set via CLI, not persisted)
    #[serde(skip)]
    pub execution_mode: ExecutionMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            http: HttpConfig::default(),
            timing: TimingConfig::default(),
            readiness: ReadinessConfig::default(),
            image: ImageConfig::default(),
            resources: Vec::new(),
            execution_mode: ExecutionMode::default(),
        }
    }
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}

/// Delays used by the REST client. All values in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait before the first poll of a submitted test
    #[serde(default = "default_poll_initial_delay")]
    pub poll_initial_delay_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Added to the test's own timeout to form the polling deadline
    #[serde(default = "default_poll_margin")]
    pub poll_margin_ms: u64,
    /// Total attempts for file uploads and snapshot imports
    #[serde(default = "default_import_attempts")]
    pub import_attempts: u32,
    #[serde(default = "default_import_retry_delay")]
    pub import_retry_delay_ms: u64,
    /// Wait before reading invocation metrics, which are updated asynchronously
    #[serde(default = "default_metrics_delay")]
    pub metrics_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_initial_delay_ms: default_poll_initial_delay(),
            poll_interval_ms: default_poll_interval(),
            poll_margin_ms: default_poll_margin(),
            import_attempts: default_import_attempts(),
            import_retry_delay_ms: default_import_retry_delay(),
            metrics_delay_ms: default_metrics_delay(),
        }
    }
}

fn default_poll_initial_delay() -> u64 {
    100
}
fn default_poll_interval() -> u64 {
    200
}
fn default_poll_margin() -> u64 {
    1000
}
fn default_import_attempts() -> u32 {
    5
}
fn default_import_retry_delay() -> u64 {
    100
}
fn default_metrics_delay() -> u64 {
    100
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Case-insensitive substring announcing the server is up
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_ready_timeout")]
    pub timeout_secs: u64,
    /// Pause between two rounds of health checks while waiting for a resource
    #[serde(default = "default_gate_interval")]
    pub gate_interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            timeout_secs: default_ready_timeout(),
            gate_interval_ms: default_gate_interval(),
        }
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn gate_interval(&self) -> Duration {
        Duration::from_millis(self.gate_interval_ms)
    }
}

fn default_marker() -> String {
    DEFAULT_READY_MARKER.to_string()
}
fn default_ready_timeout() -> u64 {
    5
}
fn default_gate_interval() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_registry")]
    pub registry: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            image: default_image(),
            tag: default_tag(),
        }
    }
}

fn default_registry() -> String {
    "quay.io".to_string()
}
fn default_image() -> String {
    "microcks/microcks-uber".to_string()
}
fn default_tag() -> String {
    "1.13.0".to_string()
}

/// A mock server declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceConfig {
    pub name: String,
    /// Base URL of this server; falls back to the top-level `url`
    pub url: Option<String>,
    #[serde(default)]
    pub main_artifacts: Vec<PathBuf>,
    #[serde(default)]
    pub secondary_artifacts: Vec<PathBuf>,
    #[serde(default)]
    pub main_remote_artifacts: Vec<RemoteArtifactConfig>,
    #[serde(default)]
    pub secondary_remote_artifacts: Vec<RemoteArtifactConfig>,
    #[serde(default)]
    pub snapshots: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArtifactConfig {
    pub url: String,
    pub secret_name: Option<String>,
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config: Config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config from {}", p))?;
                toml::from_str(&content).context("Failed to parse config")?
            }
            None => {
                let mut default_paths = vec![PathBuf::from("microcks-host.toml")];
                if let Some(home) = dirs::home_dir() {
                    default_paths.push(home.join(".config/microcks-host/config.toml"));
                }

                let mut loaded = None;
                for p in &default_paths {
                    if let Ok(content) = std::fs::read_to_string(p) {
                        loaded = Some(toml::from_str(&content).with_context(|| {
                            format!("Failed to parse config {}", p.display())
                        })?);
                        break;
                    }
                }
                loaded.unwrap_or_else(|| {
                    debug!("No config file found, using defaults");
                    Self::default()
                })
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `MICROCKS_HOST_*` overrides from `lookup`. Unparsable numbers are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MICROCKS_HOST_URL") {
            self.url = url;
        }
        if let Some(timeout) = lookup("MICROCKS_HOST_HTTP_TIMEOUT") {
            if let Ok(t) = timeout.parse::<u64>() {
                self.http.request_timeout_secs = t;
            }
        }
        if let Some(marker) = lookup("MICROCKS_HOST_READY_MARKER") {
            self.readiness.marker = marker;
        }
        if let Some(timeout) = lookup("MICROCKS_HOST_READY_TIMEOUT") {
            if let Ok(t) = timeout.parse::<u64>() {
                self.readiness.timeout_secs = t;
            }
        }
    }

    pub fn validate(&self) -> std::result::Result<(), MicrocksError> {
        url::Url::parse(&self.url)
            .map_err(|e| MicrocksError::Config(format!("Invalid url '{}': {}", self.url, e)))?;
        if self.timing.import_attempts == 0 {
            return Err(MicrocksError::Config(
                "timing.import_attempts must be at least 1".to_string(),
            ));
        }
        if self.readiness.marker.trim().is_empty() {
            return Err(MicrocksError::Config(
                "readiness.marker must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            if resource.name.trim().is_empty() {
                return Err(MicrocksError::Config(
                    "Resource name must not be empty".to_string(),
                ));
            }
            if !seen.insert(resource.name.as_str()) {
                return Err(MicrocksError::Config(format!(
                    "Duplicate resource '{}'",
                    resource.name
                )));
            }
            if let Some(url) = &resource.url {
                url::Url::parse(url).map_err(|e| {
                    MicrocksError::Config(format!(
                        "Invalid url '{}' for resource '{}': {}",
                        url, resource.name, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Base URL of `resource`, falling back to the top-level one.
    pub fn resource_url<'a>(&'a self, resource: &'a ResourceConfig) -> &'a str {
        resource.url.as_deref().unwrap_or(&self.url)
    }
}
