//! NVIDIA GPU collectors for GPUSight.
//!
//! The [`gpu::GpuCollector`] reads device state through a [`GpuBackend`] on
//! every scrape and emits one sample per reading:
//!
//! - [`nvml`] - native NVML binding (Linux only)
//! - [`smi`] - `nvidia-smi --query-gpu` output parsed as CSV
//!
//! Collectors are registered in a [`CollectorRegistry`] and selected by name.
//!
//! # Example
//!
//! ```ignore
//! use gpusight_collector::{CollectorRegistry, CollectorSelection, CollectorSettings};
//!
//! let selection = CollectorSelection {
//!     enabled: vec!["gpu".to_string()],
//!     ..Default::default()
//! };
//! let registry = CollectorRegistry::builtin()?;
//! let collectors = registry.build(&selection, &CollectorSettings::default())?;
//!
//! let mut samples = Vec::new();
//! for collector in &collectors {
//!     collector.update(&mut samples)?;
//! }
//! ```

pub mod backend;
pub mod config;
pub mod descriptors;
pub mod error;
pub mod gpu;
#[cfg(target_os = "linux")]
pub mod nvml;
pub mod registry;
pub mod smi;

pub use backend::{DeviceIdentity, DeviceQuery, GpuBackend, MemoryInfo};
pub use config::{BackendKind, CollectorSelection, CollectorSettings, GpuConfig};
pub use descriptors::GpuDescriptors;
pub use error::{BackendError, CollectorError, QueryError, Result};
pub use gpu::GpuCollector;
pub use registry::{Collector, CollectorFactory, CollectorRegistry, DefaultState};
pub use smi::{SmiBackend, SmiTable};
