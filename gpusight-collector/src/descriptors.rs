//! Fixed metric schema of the GPU collector.

use std::sync::Arc;

use gpusight_common::{MetricDesc, MetricType, build_fq_name};

/// Subsystem component of every GPU metric name.
pub const SUBSYSTEM: &str = "gpu";

/// Labels attached to every per-device series.
pub const DEVICE_LABELS: [&str; 3] = ["minor_number", "uuid", "name"];

/// Descriptors for every series the GPU collector emits.
#[derive(Debug, Clone)]
pub struct GpuDescriptors {
    pub num_devices: Arc<MetricDesc>,
    pub memory_used: Arc<MetricDesc>,
    pub memory_total: Arc<MetricDesc>,
    pub duty_cycle: Arc<MetricDesc>,
    pub power_usage: Arc<MetricDesc>,
    pub temperature: Arc<MetricDesc>,
    pub fan_speed: Arc<MetricDesc>,
}

impl GpuDescriptors {
    /// Build the table under `namespace` (e.g. `node` gives
    /// `node_gpu_memory_used_bytes`).
    pub fn new(namespace: &str) -> gpusight_common::Result<Self> {
        let device = |name: &str, help: &str| -> gpusight_common::Result<Arc<MetricDesc>> {
            MetricDesc::new(
                build_fq_name(namespace, SUBSYSTEM, name),
                help,
                MetricType::Gauge,
                &DEVICE_LABELS,
            )
            .map(Arc::new)
        };

        Ok(Self {
            num_devices: Arc::new(MetricDesc::new(
                build_fq_name(namespace, SUBSYSTEM, "num_devices"),
                "Number of GPU devices",
                MetricType::Gauge,
                &[],
            )?),
            memory_used: device(
                "memory_used_bytes",
                "Memory used by the GPU device in bytes",
            )?,
            memory_total: device(
                "memory_total_bytes",
                "Total memory of the GPU device in bytes",
            )?,
            duty_cycle: device(
                "duty_cycle",
                "Percent of time over the past sample period during which one or more kernels were executing on the GPU device",
            )?,
            power_usage: device(
                "power_usage_milliwatts",
                "Power usage of the GPU device in milliwatts",
            )?,
            temperature: device(
                "temperature_celsius",
                "Temperature of the GPU device in celsius",
            )?,
            fan_speed: device(
                "fanspeed_percent",
                "Fanspeed of the GPU device as a percent of its maximum",
            )?,
        })
    }

    /// All descriptors, device count first.
    pub fn all(&self) -> [&Arc<MetricDesc>; 7] {
        [
            &self.num_devices,
            &self.memory_used,
            &self.memory_total,
            &self.duty_cycle,
            &self.power_usage,
            &self.temperature,
            &self.fan_speed,
        ]
    }
}
