//! Dashboard HTTP Server
//!
//! Axum-based server with embedded static files, CORS, and graceful shutdown.

use crate::dashboard::api::{api_router, DashboardApiState};
use crate::dashboard::config::DashboardConfig;
use crate::pipeline::Pipeline;
use axum::{
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use rust_embed::Embed;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Embedded static files for the dashboard
#[derive(Embed)]
#[folder = "src/dashboard/static/"]
struct StaticAssets;

/// Dashboard server
pub struct DashboardServer {
    config: DashboardConfig,
    state: DashboardApiState,
}

impl DashboardServer {
    /// Create a new dashboard server with the given configuration
    pub fn new(config: DashboardConfig, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            state: DashboardApiState::new(pipeline),
        }
    }

    /// Build the router with all routes and middleware
    pub fn build_router(&self) -> Router {
        let cors = if self.config.cors_enabled {
            CorsLayer::new()
                .allow_origin(
                    self.config
                        .cors_origins
                        .iter()
                        .filter_map(|o| o.parse().ok())
                        .collect::<Vec<_>>(),
                )
                .allow_methods([Method::GET, Method::POST, Method::PUT])
                .allow_headers([header::CONTENT_TYPE])
        } else {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers([header::CONTENT_TYPE])
        };

        let mut router = Router::new()
            .route("/", get(index_handler))
            .route("/{*path}", get(static_handler))
            .nest("/api", api_router(self.state.clone()))
            .layer(cors);

        if self.config.log_requests {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start the server and run until shutdown signal
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.socket_addr();
        let router = self.build_router();

        info!("Starting dashboard server on {}", addr);

        if !self.config.is_localhost() {
            warn!("Dashboard bound to {} without authentication", addr);
        }

        info!("Dashboard available at {}", self.config.base_url());

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Dashboard server shut down gracefully");
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }
}

/// Serve the index.html file
async fn index_handler() -> impl IntoResponse {
    match StaticAssets::get("index.html") {
        Some(content) => Html(content.data.into_owned()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve static files from embedded assets
async fn static_handler(axum::extract::Path(path): axum::extract::Path<String>) -> impl IntoResponse {
    let path = path.trim_start_matches('/');

    // Security: prevent path traversal
    if path.contains("..") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match StaticAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string();

            (
                [
                    (header::CONTENT_TYPE, mime),
                    (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
                ],
                content.data.into_owned(),
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::store::Store;
    use crate::transport::RecordingTransport;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use parking_lot::Mutex;
    use tower::ServiceExt;

    fn server() -> DashboardServer {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let pipeline = Pipeline::builder(
            store,
            Arc::new(ScriptedModel::default()),
            Arc::new(RecordingTransport::new()),
        )
        .build();
        DashboardServer::new(DashboardConfig::default(), Arc::new(pipeline))
    }

    async fn get(uri: &str) -> axum::response::Response {
        server()
            .build_router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = get("/api/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["uptime_secs"].is_number());
        assert_eq!(json["store"]["subjects"], 0);
    }

    #[tokio::test]
    async fn test_liveness_and_readiness() {
        assert_eq!(get("/api/healthz").await.status(), StatusCode::OK);
        assert_eq!(get("/api/readyz").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_subjects_nested_under_api() {
        let response = get("/api/subjects").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_index_returns_html() {
        let response = get("/").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8_lossy(&body);
        assert!(html.contains("<!DOCTYPE html>"));
        assert!(html.contains("ErgoBot"));
    }

    #[tokio::test]
    async fn test_path_traversal_blocked() {
        let response = get("/../../etc/passwd").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_file_returns_404() {
        let response = get("/nonexistent.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
