//! GPU collector: turns backend device readings into samples.

use std::sync::Arc;

use gpusight_common::{MetricDesc, MetricSink, Sample};
use tracing::{debug, error, info, warn};

use crate::backend::{DeviceQuery, GpuBackend};
use crate::config::{BackendKind, CollectorSettings};
use crate::descriptors::GpuDescriptors;
use crate::error::{QueryError, Result};
use crate::registry::Collector;
use crate::smi::SmiBackend;

/// Registry name of the GPU collector.
pub const NAME: &str = "gpu";

/// Collector exposing per-device GPU metrics from a [`GpuBackend`].
pub struct GpuCollector {
    descriptors: GpuDescriptors,
    backend: Box<dyn GpuBackend>,
}

impl GpuCollector {
    /// Create a collector over an already constructed backend.
    pub fn new(namespace: &str, backend: Box<dyn GpuBackend>) -> Result<Self> {
        let descriptors = GpuDescriptors::new(namespace)?;
        info!(backend = backend.name(), "GPU collector created");

        Ok(Self {
            descriptors,
            backend,
        })
    }

    /// Create a collector with the backend selected in `settings`.
    ///
    /// Fails if the NVML backend is selected and NVML cannot be initialized.
    pub fn from_settings(settings: &CollectorSettings) -> Result<Self> {
        let backend: Box<dyn GpuBackend> = match settings.gpu.backend {
            BackendKind::Nvml => nvml_backend()?,
            BackendKind::NvidiaSmi => Box::new(SmiBackend::new(&settings.gpu.smi_command)),
        };

        Self::new(&settings.namespace, backend)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn emit_devices(&self, query: &dyn DeviceQuery, sink: &mut dyn MetricSink) {
        let count = query.device_count().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to get GPU device count");
            0
        });

        emit(sink, &self.descriptors.num_devices, Vec::new(), f64::from(count));

        for index in 0..count {
            let identity = match query.device_identity(index) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(device = index, error = %e, "Skipping GPU device without identity");
                    continue;
                }
            };
            let labels = identity.label_values();
            let descs = &self.descriptors;

            match query.device_memory(index) {
                Ok(memory) => {
                    if let Some(used) = memory.used_bytes {
                        emit(sink, &descs.memory_used, labels.clone(), used);
                    }
                    if let Some(total) = memory.total_bytes {
                        emit(sink, &descs.memory_total, labels.clone(), total);
                    }
                }
                Err(e) => field_failed(index, "memory", &e),
            }

            let readings = [
                (&descs.duty_cycle, "utilization", query.device_utilization(index)),
                (&descs.power_usage, "power", query.device_power(index)),
                (&descs.temperature, "temperature", query.device_temperature(index)),
                (&descs.fan_speed, "fan speed", query.device_fan_speed(index)),
            ];

            for (desc, field, reading) in readings {
                match reading {
                    Ok(value) => emit(sink, desc, labels.clone(), value),
                    Err(e) => field_failed(index, field, &e),
                }
            }
        }
    }
}

impl Collector for GpuCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn update(&self, sink: &mut dyn MetricSink) -> Result<()> {
        let query = match self.backend.query() {
            Ok(query) => query,
            Err(e) => {
                debug!(backend = self.backend.name(), error = %e, "GPU query failed");
                emit(sink, &self.descriptors.num_devices, Vec::new(), 0.0);
                return Err(e.into());
            }
        };

        self.emit_devices(query.as_ref(), sink);
        Ok(())
    }

    fn shutdown(&self) {
        match self.backend.shutdown() {
            Ok(()) => debug!(backend = self.backend.name(), "GPU backend released"),
            Err(e) => error!(
                backend = self.backend.name(),
                error = %e,
                "GPU backend shutdown failed"
            ),
        }
    }
}

/// Registry factory for the GPU collector.
pub fn factory(settings: &CollectorSettings) -> Result<Box<dyn Collector>> {
    Ok(Box::new(GpuCollector::from_settings(settings)?))
}

#[cfg(target_os = "linux")]
fn nvml_backend() -> Result<Box<dyn GpuBackend>> {
    Ok(Box::new(crate::nvml::NvmlBackend::init()?))
}

#[cfg(not(target_os = "linux"))]
fn nvml_backend() -> Result<Box<dyn GpuBackend>> {
    Err(crate::error::BackendError::Unsupported { backend: "nvml" }.into())
}

fn emit(sink: &mut dyn MetricSink, desc: &Arc<MetricDesc>, labels: Vec<String>, value: f64) {
    match Sample::new(Arc::clone(desc), labels, value) {
        Ok(sample) => sink.emit(sample),
        Err(e) => error!(error = %e, "Dropping malformed sample"),
    }
}

fn field_failed(index: u32, field: &'static str, error: &QueryError) {
    debug!(device = index, field, error = %error, "GPU reading unavailable");
}
