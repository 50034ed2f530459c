//! Error types for GPU collectors and their backends.

use std::process::ExitStatus;

use thiserror::Error;

/// Failure to read a single device field.
///
/// Always contained by the sampler: the affected sample (or device, for
/// identity fields) is skipped and the scrape continues.
#[derive(Error, Debug)]
pub enum QueryError {
    /// No device at this index.
    #[error("no device at index {index}")]
    NoSuchDevice { index: u32 },

    /// The backend reported the field as unavailable (e.g. `[N/A]`).
    #[error("{field} unavailable: {reason}")]
    Unavailable { field: &'static str, reason: String },

    /// The field value could not be parsed as a number.
    #[error("{field}: cannot parse '{value}': {source}")]
    Parse {
        field: &'static str,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    /// NVML call failed.
    #[cfg(target_os = "linux")]
    #[error("{field}: {source}")]
    Nvml {
        field: &'static str,
        #[source]
        source: nvml_wrapper::error::NvmlError,
    },
}

impl QueryError {
    pub(crate) fn unavailable(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure of a backend as a whole.
///
/// Returned from a scrape (or from collector construction, for [`Init`]).
///
/// [`Init`]: BackendError::Init
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend could not be initialized.
    #[error("failed to initialize {backend}: {message}")]
    Init {
        backend: &'static str,
        message: String,
    },

    /// The backend is not available on this platform.
    #[error("{backend} backend is not supported on this platform")]
    Unsupported { backend: &'static str },

    /// The external command could not be started.
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The external command exited unsuccessfully.
    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    /// The command output is not a well-formed table.
    #[error("malformed nvidia-smi output: {0}")]
    Csv(#[from] csv::Error),

    /// An expected column is absent from the output header.
    #[error("nvidia-smi output is missing column '{0}'")]
    MissingColumn(&'static str),

    /// A header-less table does not have the requested number of columns.
    #[error("nvidia-smi output has {actual} columns, expected {expected}")]
    ColumnCount { expected: usize, actual: usize },

    /// The backend has already been shut down.
    #[error("{0} backend has been shut down")]
    Shutdown(&'static str),

    /// Releasing backend resources failed.
    #[error("failed to shut down {backend}: {message}")]
    ShutdownFailed {
        backend: &'static str,
        message: String,
    },
}

/// Errors surfaced by collectors and the collector registry.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Metric descriptor could not be built.
    #[error("Metric error: {0}")]
    Metric(#[from] gpusight_common::Error),

    /// A collector name is not registered.
    #[error("Unknown collector: {0}")]
    UnknownCollector(String),

    /// A collector name was registered twice.
    #[error("Collector already registered: {0}")]
    DuplicateCollector(String),
}

/// Result type alias using [`CollectorError`].
pub type Result<T> = std::result::Result<T, CollectorError>;
