//! Collector configuration.

use serde::{Deserialize, Serialize};

use crate::smi::DEFAULT_COMMAND;

/// Which device backend the GPU collector uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Native NVML binding.
    #[default]
    Nvml,
    /// `nvidia-smi` invoked once per scrape.
    NvidiaSmi,
}

/// GPU collector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Device backend (default: "nvml").
    #[serde(default)]
    pub backend: BackendKind,

    /// Command run by the nvidia-smi backend (default: "nvidia-smi").
    #[serde(default = "default_smi_command")]
    pub smi_command: String,
}

fn default_smi_command() -> String {
    DEFAULT_COMMAND.to_string()
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            smi_command: default_smi_command(),
        }
    }
}

/// Explicit collector enable/disable lists. Collectors named in neither
/// list fall back to their registered default state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorSelection {
    /// Collectors to run regardless of their default state.
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Collectors to skip regardless of their default state.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl CollectorSelection {
    /// Explicit state for `name`, if any.
    pub fn explicit(&self, name: &str) -> Option<bool> {
        if self.disabled.iter().any(|n| n == name) {
            Some(false)
        } else if self.enabled.iter().any(|n| n == name) {
            Some(true)
        } else {
            None
        }
    }

    /// Names listed in both `enabled` and `disabled`.
    pub fn conflicts(&self) -> Vec<&str> {
        self.enabled
            .iter()
            .filter(|n| self.disabled.contains(n))
            .map(String::as_str)
            .collect()
    }
}

/// Everything a collector factory needs to build its collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSettings {
    /// Metric namespace (first component of every metric name).
    pub namespace: String,
    pub gpu: GpuConfig,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            namespace: "node".to_string(),
            gpu: GpuConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_config_defaults() {
        let config: GpuConfig = json5::from_str("{}").unwrap();

        assert_eq!(config.backend, BackendKind::Nvml);
        assert_eq!(config.smi_command, "nvidia-smi");
    }

    #[test]
    fn test_backend_kind_names() {
        let config: GpuConfig = json5::from_str(
            r#"{ backend: "nvidia-smi", smi_command: "/usr/bin/nvidia-smi" }"#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendKind::NvidiaSmi);
        assert_eq!(config.smi_command, "/usr/bin/nvidia-smi");
    }

    #[test]
    fn test_selection_disabled_wins() {
        let selection = CollectorSelection {
            enabled: vec!["gpu".to_string()],
            disabled: vec!["gpu".to_string()],
        };

        assert_eq!(selection.explicit("gpu"), Some(false));
        assert_eq!(selection.conflicts(), vec!["gpu"]);
        assert_eq!(selection.explicit("other"), None);
    }
}
