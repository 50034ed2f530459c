//! NVML backend.

use nvml_wrapper::Device;
use nvml_wrapper::Nvml;
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::error::NvmlError;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::backend::{DeviceIdentity, DeviceQuery, GpuBackend, MemoryInfo};
use crate::error::{BackendError, QueryError};

const NAME: &str = "nvml";

/// Backend over an initialized NVML handle.
///
/// NVML is initialized once at construction. Every scrape holds the handle's
/// lock for its whole query sequence, so scrapes never interleave native calls.
pub struct NvmlBackend {
    nvml: Mutex<Option<Nvml>>,
}

impl NvmlBackend {
    /// Initialize NVML. Fails if the library cannot be loaded or initialized.
    pub fn init() -> Result<Self, BackendError> {
        let nvml = Nvml::init().map_err(|e| BackendError::Init {
            backend: NAME,
            message: format!(
                "{}. Make sure NVML is in the shared library search path",
                e
            ),
        })?;

        match nvml.sys_driver_version() {
            Ok(version) => info!(driver = %version, "NVML initialized"),
            Err(_) => info!("NVML initialized"),
        }

        Ok(Self {
            nvml: Mutex::new(Some(nvml)),
        })
    }
}

impl GpuBackend for NvmlBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn query(&self) -> Result<Box<dyn DeviceQuery + '_>, BackendError> {
        let nvml = MutexGuard::try_map(self.nvml.lock(), Option::as_mut)
            .map_err(|_| BackendError::Shutdown(NAME))?;

        Ok(Box::new(NvmlQuery { nvml }))
    }

    fn shutdown(&self) -> Result<(), BackendError> {
        let Some(nvml) = self.nvml.lock().take() else {
            return Ok(());
        };

        nvml.shutdown().map_err(|e| {
            warn!(error = %e, "NVML shutdown failed");
            BackendError::ShutdownFailed {
                backend: NAME,
                message: e.to_string(),
            }
        })?;

        info!("NVML shut down");
        Ok(())
    }
}

/// NVML access for one scrape; holds the backend lock until dropped.
struct NvmlQuery<'a> {
    nvml: MappedMutexGuard<'a, Nvml>,
}

fn nvml_err(field: &'static str) -> impl FnOnce(NvmlError) -> QueryError {
    move |source| QueryError::Nvml { field, source }
}

impl NvmlQuery<'_> {
    fn device(&self, index: u32) -> Result<Device<'_>, QueryError> {
        self.nvml
            .device_by_index(index)
            .map_err(nvml_err("device handle"))
    }
}

impl DeviceQuery for NvmlQuery<'_> {
    fn device_count(&self) -> Result<u32, QueryError> {
        self.nvml.device_count().map_err(nvml_err("device count"))
    }

    fn device_identity(&self, index: u32) -> Result<DeviceIdentity, QueryError> {
        let device = self.device(index)?;

        let minor_number = device.minor_number().map_err(nvml_err("minor number"))?;
        let uuid = device.uuid().map_err(nvml_err("uuid"))?;
        let name = device.name().map_err(nvml_err("name"))?;

        if uuid.is_empty() {
            return Err(QueryError::unavailable("uuid", "empty"));
        }
        if name.is_empty() {
            return Err(QueryError::unavailable("name", "empty"));
        }

        Ok(DeviceIdentity {
            minor_number: minor_number.to_string(),
            uuid,
            name,
        })
    }

    fn device_memory(&self, index: u32) -> Result<MemoryInfo, QueryError> {
        let info = self
            .device(index)?
            .memory_info()
            .map_err(nvml_err("memory info"))?;

        Ok(MemoryInfo {
            used_bytes: Some(info.used as f64),
            total_bytes: Some(info.total as f64),
        })
    }

    fn device_utilization(&self, index: u32) -> Result<f64, QueryError> {
        self.device(index)?
            .utilization_rates()
            .map(|u| u.gpu as f64)
            .map_err(nvml_err("utilization rates"))
    }

    fn device_power(&self, index: u32) -> Result<f64, QueryError> {
        self.device(index)?
            .power_usage()
            .map(|mw| mw as f64)
            .map_err(nvml_err("power usage"))
    }

    fn device_temperature(&self, index: u32) -> Result<f64, QueryError> {
        self.device(index)?
            .temperature(TemperatureSensor::Gpu)
            .map(|c| c as f64)
            .map_err(nvml_err("temperature"))
    }

    fn device_fan_speed(&self, index: u32) -> Result<f64, QueryError> {
        self.device(index)?
            .fan_speed(0)
            .map(|pct| pct as f64)
            .map_err(nvml_err("fan speed"))
    }
}
