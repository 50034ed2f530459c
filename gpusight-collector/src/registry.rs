//! Collector registration and selection.

use std::sync::Arc;

use gpusight_common::MetricSink;
use tracing::{debug, info};

use crate::config::{CollectorSelection, CollectorSettings};
use crate::error::{CollectorError, Result};

/// A named source of samples, updated once per scrape.
///
/// Collectors are shared across concurrent scrapes, so `update` takes `&self`
/// and keeps per-scrape state local.
pub trait Collector: Send + Sync {
    /// Collector name, as used in selection lists and scrape metrics.
    fn name(&self) -> &'static str;

    /// Emit this scrape's samples into `sink`.
    ///
    /// An error marks the scrape of this collector as failed. Samples emitted
    /// before the error are still valid.
    fn update(&self, sink: &mut dyn MetricSink) -> Result<()>;

    /// Release resources held by the collector.
    fn shutdown(&self) {}
}

/// Whether a collector runs when no selection list names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultState {
    Enabled,
    Disabled,
}

/// Builds a collector from the shared settings.
pub type CollectorFactory = fn(&CollectorSettings) -> Result<Box<dyn Collector>>;

struct Registration {
    name: &'static str,
    default_state: DefaultState,
    factory: CollectorFactory,
}

/// Registry of known collectors, in registration order.
#[derive(Default)]
pub struct CollectorRegistry {
    registrations: Vec<Registration>,
}

impl CollectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in collector.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(crate::gpu::NAME, DefaultState::Disabled, crate::gpu::factory)?;
        Ok(registry)
    }

    /// Register a collector under `name`.
    pub fn register(
        &mut self,
        name: &'static str,
        default_state: DefaultState,
        factory: CollectorFactory,
    ) -> Result<()> {
        if self.registrations.iter().any(|r| r.name == name) {
            return Err(CollectorError::DuplicateCollector(name.to_string()));
        }

        self.registrations.push(Registration {
            name,
            default_state,
            factory,
        });
        Ok(())
    }

    /// Names of every registered collector.
    pub fn names(&self) -> Vec<&'static str> {
        self.registrations.iter().map(|r| r.name).collect()
    }

    /// Default state of `name`, if registered.
    pub fn default_state(&self, name: &str) -> Option<DefaultState> {
        self.registrations
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.default_state)
    }

    /// Whether `name` runs under `selection`.
    pub fn is_enabled(&self, name: &str, selection: &CollectorSelection) -> bool {
        match selection.explicit(name) {
            Some(enabled) => enabled,
            None => self.default_state(name) == Some(DefaultState::Enabled),
        }
    }

    /// Construct every collector enabled under `selection`.
    ///
    /// Unknown names in either list are rejected. A factory failure aborts
    /// the whole build.
    pub fn build(
        &self,
        selection: &CollectorSelection,
        settings: &CollectorSettings,
    ) -> Result<Vec<Arc<dyn Collector>>> {
        if let Some(unknown) = selection
            .enabled
            .iter()
            .chain(&selection.disabled)
            .find(|name| self.default_state(name).is_none())
        {
            return Err(CollectorError::UnknownCollector(unknown.clone()));
        }

        let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
        for registration in &self.registrations {
            if !self.is_enabled(registration.name, selection) {
                debug!(collector = registration.name, "Collector disabled");
                continue;
            }

            let collector = (registration.factory)(settings)?;
            info!(collector = registration.name, "Collector enabled");
            collectors.push(Arc::from(collector));
        }

        Ok(collectors)
    }
}
