//! Configuration for the GPU exporter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use gpusight_collector::{CollectorSelection, CollectorSettings, GpuConfig};
use gpusight_common::{LoggingConfig, is_valid_metric_name};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Paths served by the exporter itself.
const RESERVED_PATHS: [&str; 3] = ["/", "/health", "/collectors"];

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP endpoint settings.
    #[serde(default)]
    pub exporter: HttpConfig,

    /// Which collectors run.
    #[serde(default)]
    pub collectors: CollectorSelection,

    /// GPU collector settings.
    #[serde(default)]
    pub gpu: GpuConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:9835").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Metric namespace (default: "node").
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_listen() -> String {
    "0.0.0.0:9835".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_namespace() -> String {
    "node".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            namespace: default_namespace(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .exporter
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.exporter.listen
            )));
        }

        if !self.exporter.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if RESERVED_PATHS.contains(&self.exporter.path.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is reserved",
                self.exporter.path
            )));
        }

        // An empty namespace drops the prefix entirely
        if !self.exporter.namespace.is_empty() && !is_valid_metric_name(&self.exporter.namespace)
        {
            return Err(ConfigError::Validation(format!(
                "Invalid metric namespace: {}",
                self.exporter.namespace
            )));
        }

        if self.gpu.smi_command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "gpu.smi_command must not be empty".to_string(),
            ));
        }

        let conflicts = self.collectors.conflicts();
        if !conflicts.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Collectors both enabled and disabled: {}",
                conflicts.join(", ")
            )));
        }

        Ok(())
    }

    /// Settings handed to collector factories.
    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            namespace: self.exporter.namespace.clone(),
            gpu: self.gpu.clone(),
        }
    }
}
