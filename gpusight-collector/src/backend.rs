//! Device query interface shared by the NVML and nvidia-smi backends.

use crate::error::{BackendError, QueryError};

/// Stable identity of a physical GPU, used as the label set of every
/// per-device series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub minor_number: String,
    pub uuid: String,
    pub name: String,
}

impl DeviceIdentity {
    /// Label values in descriptor order: `minor_number`, `uuid`, `name`.
    pub fn label_values(&self) -> Vec<String> {
        vec![
            self.minor_number.clone(),
            self.uuid.clone(),
            self.name.clone(),
        ]
    }
}

/// Device memory readings in bytes. Either side may be missing when the
/// backend reports them separately.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryInfo {
    pub used_bytes: Option<f64>,
    pub total_bytes: Option<f64>,
}

/// A source of GPU devices.
///
/// Implementations must be safe to share across concurrent scrapes.
pub trait GpuBackend: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Open one scrape's worth of device access.
    ///
    /// Failure here is a scrape-level error: no per-device samples can be
    /// produced for this cycle.
    fn query(&self) -> Result<Box<dyn DeviceQuery + '_>, BackendError>;

    /// Release backend resources. Later calls to [`query`](Self::query)
    /// may fail.
    fn shutdown(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Per-field device reads within a single scrape.
pub trait DeviceQuery {
    fn device_count(&self) -> Result<u32, QueryError>;

    fn device_identity(&self, index: u32) -> Result<DeviceIdentity, QueryError>;

    fn device_memory(&self, index: u32) -> Result<MemoryInfo, QueryError>;

    /// Duty cycle in percent.
    fn device_utilization(&self, index: u32) -> Result<f64, QueryError>;

    /// Power draw in milliwatts.
    fn device_power(&self, index: u32) -> Result<f64, QueryError>;

    /// GPU core temperature in degrees Celsius.
    fn device_temperature(&self, index: u32) -> Result<f64, QueryError>;

    /// Fan speed as a percent of its maximum.
    fn device_fan_speed(&self, index: u32) -> Result<f64, QueryError>;
}
