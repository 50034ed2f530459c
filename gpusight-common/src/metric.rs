//! Metric descriptors and the samples collectors emit against them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::naming::{is_valid_label_name, is_valid_metric_name};

/// Prometheus metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Gauge,
}

impl MetricType {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
        }
    }
}

/// Immutable description of a metric family.
///
/// Built once when a collector is constructed and shared by every sample
/// emitted against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    fq_name: String,
    help: String,
    metric_type: MetricType,
    label_names: Vec<String>,
}

impl MetricDesc {
    /// Create a new descriptor, validating the metric and label names.
    pub fn new(
        fq_name: impl Into<String>,
        help: impl Into<String>,
        metric_type: MetricType,
        label_names: &[&str],
    ) -> Result<Self> {
        let fq_name = fq_name.into();
        if !is_valid_metric_name(&fq_name) {
            return Err(Error::MetricName(fq_name));
        }

        if let Some(bad) = label_names.iter().find(|l| !is_valid_label_name(l)) {
            return Err(Error::MetricName(format!("{}: bad label '{}'", fq_name, bad)));
        }

        Ok(Self {
            fq_name,
            help: help.into(),
            metric_type,
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        })
    }

    /// The fully-qualified metric name.
    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    /// Label names, in the order sample label values must follow.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

/// A single value for a metric family at scrape time.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    desc: Arc<MetricDesc>,
    label_values: Vec<String>,
    value: f64,
}

impl Sample {
    /// Create a sample. `label_values` must match the descriptor's label names
    /// one-to-one.
    pub fn new(desc: Arc<MetricDesc>, label_values: Vec<String>, value: f64) -> Result<Self> {
        if label_values.len() != desc.label_names.len() {
            return Err(Error::LabelArity {
                metric: desc.fq_name.clone(),
                expected: desc.label_names.len(),
                actual: label_values.len(),
            });
        }

        Ok(Self {
            desc,
            label_values,
            value,
        })
    }

    pub fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Iterate over `(label name, label value)` pairs.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.desc
            .label_names
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }

    /// Look up a label value by name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels().find(|(k, _)| *k == name).map(|(_, v)| v)
    }
}

/// Output channel for samples produced during one scrape.
pub trait MetricSink {
    fn emit(&mut self, sample: Sample);
}

impl MetricSink for Vec<Sample> {
    fn emit(&mut self, sample: Sample) {
        self.push(sample);
    }
}
