//! Prometheus exporter for NVIDIA GPU metrics.
//!
//! Every scrape of the metrics endpoint runs the enabled collectors, renders
//! their samples in the Prometheus text format and returns them. Nothing is
//! cached between scrapes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  NVML /         │<────│     Scraper     │<────│   HTTP Server   │
//! │  nvidia-smi     │     │  (collectors)   │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! gpusight-exporter --config gpusight.json5 --collector gpu
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod exposition;
pub mod http;
pub mod scrape;

pub use config::ExporterConfig;
pub use http::{HttpServer, stop_server};
pub use scrape::{Scraper, SharedScraper};
