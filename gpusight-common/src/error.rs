use thiserror::Error;

/// Common error type for GPUSight components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid metric name: {0}")]
    MetricName(String),

    #[error("Metric {metric} expects {expected} label values, got {actual}")]
    LabelArity {
        metric: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias using GPUSight's Error.
pub type Result<T> = std::result::Result<T, Error>;
