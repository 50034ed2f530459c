//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::exposition::{CONTENT_TYPE, render};
use crate::scrape::SharedScraper;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    scraper: SharedScraper,
    metrics_path: String,
}

/// Create the HTTP router.
fn create_router(scraper: SharedScraper, metrics_path: &str) -> Router {
    let state = AppState {
        scraper,
        metrics_path: metrics_path.to_string(),
    };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/collectors", get(collectors_handler))
        .route("/", get(index_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint.
///
/// Collectors block on device access, so every scrape runs on the blocking
/// pool. Concurrent requests scrape independently.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let scraper = state.scraper.clone();
    let rendered = tokio::task::spawn_blocking(move || render(&scraper.scrape())).await;

    match rendered {
        Ok(body) => (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Scrape task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("scrape failed: {}\n", e),
            )
                .into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /collectors endpoint: enabled collector names as JSON.
async fn collectors_handler(State(state): State<AppState>) -> Response {
    let names = state.scraper.collector_names();
    Json(serde_json::json!({ "collectors": names })).into_response()
}

/// Landing page linking to the metrics endpoint.
async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>GPUSight Exporter</title></head>\n<body>\n<h1>GPUSight Exporter</h1>\n<p><a href=\"{0}\">Metrics</a></p>\n</body>\n</html>\n",
        state.metrics_path
    ))
}

/// HTTP server configuration.
pub struct HttpServer {
    scraper: SharedScraper,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(scraper: SharedScraper, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            scraper,
            listen_addr,
            metrics_path,
        }
    }

    /// Bind the listener and serve until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until the shutdown signal is
    /// received.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let router = create_router(self.scraper, &self.metrics_path);
        let addr = listener.local_addr().unwrap_or(self.listen_addr);

        info!(
            addr = %addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        // Run server with graceful shutdown
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Signal a running server to stop and wait up to `grace` for it to exit.
///
/// A server that already exited is not an error. A server still running
/// after `grace` is abandoned.
pub async fn stop_server(
    shutdown_tx: &watch::Sender<bool>,
    task: JoinHandle<anyhow::Result<()>>,
    grace: Duration,
) -> Result<anyhow::Result<()>, JoinError> {
    if let Err(e) = shutdown_tx.send(true) {
        warn!(error = %e, "HTTP server already stopped");
    }

    match tokio::time::timeout(grace, task).await {
        Ok(result) => result,
        Err(_) => {
            warn!("HTTP server did not stop in time");
            Ok(Ok(()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::Scraper;
    use axum::body::Body;
    use axum::http::Request;
    use gpusight_collector::{
        BackendKind, Collector, CollectorSettings, GpuCollector, GpuConfig,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn make_scraper(collectors: Vec<Arc<dyn Collector>>) -> SharedScraper {
        Arc::new(Scraper::new("node", collectors).unwrap())
    }

    /// A GPU collector whose nvidia-smi command cannot be started.
    fn broken_gpu() -> Arc<dyn Collector> {
        let settings = CollectorSettings {
            namespace: "node".to_string(),
            gpu: GpuConfig {
                backend: BackendKind::NvidiaSmi,
                smi_command: "/nonexistent/nvidia-smi".to_string(),
            },
        };
        Arc::new(GpuCollector::from_settings(&settings).unwrap())
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let router = create_router(make_scraper(Vec::new()), "/metrics");

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("version=0.0.4"));
    }

    #[tokio::test]
    async fn test_metrics_with_failing_collector() {
        let router = create_router(make_scraper(vec![broken_gpu()]), "/metrics");

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // A failed collector still yields a successful scrape response.
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        assert!(body.contains("# TYPE node_gpu_num_devices gauge"));
        assert!(body.contains("node_gpu_num_devices 0"));
        assert!(body.contains("node_scrape_collector_success{collector=\"gpu\"} 0"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = create_router(make_scraper(Vec::new()), "/metrics");

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_collectors_endpoint() {
        let router = create_router(make_scraper(vec![broken_gpu()]), "/metrics");

        let response = router
            .oneshot(Request::get("/collectors").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["collectors"], serde_json::json!(["gpu"]));
    }

    #[tokio::test]
    async fn test_index_links_metrics_path() {
        let router = create_router(make_scraper(Vec::new()), "/gpu/metrics");

        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("href=\"/gpu/metrics\""));
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let router = create_router(make_scraper(Vec::new()), "/gpu/metrics");

        let response = router
            .clone()
            .oneshot(Request::get("/gpu/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Default path should 404
        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stop_running_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = HttpServer::new(make_scraper(Vec::new()), addr, "/metrics".to_string());
        let task = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

        let result = stop_server(&shutdown_tx, task, Duration::from_secs(5)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_stop_after_server_exited() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            drop(shutdown_rx);
            Err::<(), _>(anyhow::anyhow!("bind failed"))
        });
        while shutdown_tx.receiver_count() > 0 {
            tokio::task::yield_now().await;
        }

        let result = stop_server(&shutdown_tx, task, Duration::from_secs(5)).await;
        assert!(matches!(result, Ok(Err(_))));
    }
}
