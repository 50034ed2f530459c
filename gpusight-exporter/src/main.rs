//! Prometheus exporter for NVIDIA GPU metrics.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use gpusight_collector::CollectorRegistry;
use gpusight_exporter::{ExporterConfig, HttpServer, Scraper, stop_server};

/// How long the HTTP server may take to drain on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Prometheus exporter for NVIDIA GPU metrics.
#[derive(Parser, Debug)]
#[command(name = "gpusight-exporter")]
#[command(about = "Export NVIDIA GPU metrics in the Prometheus format")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Enable a collector (repeatable).
    #[arg(long = "collector", value_name = "NAME")]
    collectors: Vec<String>,

    /// Disable a collector (repeatable).
    #[arg(long = "no-collector", value_name = "NAME")]
    no_collectors: Vec<String>,

    /// Log level (trace, debug, info, warn, error). Overrides config.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // Apply CLI overrides
    if let Some(listen) = args.listen {
        config.exporter.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    for name in args.collectors {
        config.collectors.disabled.retain(|n| *n != name);
        config.collectors.enabled.push(name);
    }
    for name in args.no_collectors {
        config.collectors.enabled.retain(|n| *n != name);
        config.collectors.disabled.push(name);
    }
    config.validate()?;

    gpusight_common::init_tracing(&config.logging)?;

    info!("Starting GPUSight Exporter");

    // Construct collectors; any initialization failure is fatal
    let registry = CollectorRegistry::builtin()?;
    let collectors = registry
        .build(&config.collectors, &config.collector_settings())
        .map_err(|e| {
            error!(error = %e, "Failed to initialize collectors");
            e
        })?;

    if collectors.is_empty() {
        warn!(
            available = ?registry.names(),
            "No collectors enabled; only scrape metrics will be exported"
        );
    }

    let scraper = Arc::new(Scraper::new(&config.exporter.namespace, collectors)?);

    // Parse listen address
    let listen_addr = config
        .exporter
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(scraper.clone(), listen_addr, config.exporter.path.clone());
    let mut http_task = tokio::spawn(async move { http_server.run(shutdown_rx).await });

    // Wait for a shutdown signal, or for the server to stop on its own
    let server_result = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut http_task => Some(result),
    };

    let server_result = match server_result {
        Some(result) => result,
        None => stop_server(&shutdown_tx, http_task, SHUTDOWN_GRACE).await,
    };

    // Release device handles only after the server stopped scraping
    scraper.shutdown();

    match server_result {
        Ok(Ok(())) => {
            info!("Exporter stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server error");
            Err(e)
        }
        Err(e) => Err(anyhow::anyhow!("HTTP server task failed: {}", e)),
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
