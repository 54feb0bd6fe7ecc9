//! Health Check API
//!
//! Provides health check endpoint for monitoring and load balancers.

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::pipeline::SharedStore;
use crate::store::StoreStats;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Application version
    pub version: &'static str,
    /// Store probed by readiness
    pub store: SharedStore,
}

impl AppState {
    /// Create new application state
    pub fn new(store: SharedStore) -> Self {
        Self {
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
            store,
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status
    pub status: &'static str,
    /// Application version
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Timestamp (ISO 8601)
    pub timestamp: String,
    /// Store totals; absent when the store is unreadable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreStats>,
}

/// Health check handler
///
/// Returns 200 OK with health information.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.store.lock().stats();
    let (status, store) = match stats {
        Ok(stats) => ("ok", Some(stats)),
        Err(e) => {
            tracing::warn!("Store stats failed: {}", e);
            ("degraded", None)
        }
    };

    Json(HealthResponse {
        status,
        version: state.version,
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        store,
    })
}

/// Liveness probe (minimal response)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 503 until the store answers
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.store.lock().stats() {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Create health check router
pub fn health_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use parking_lot::Mutex;

    fn state() -> AppState {
        AppState::new(Arc::new(Mutex::new(Store::open_in_memory().unwrap())))
    }

    #[test]
    fn test_app_state_uptime() {
        let state = state();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(state.uptime_secs() < 10);
    }

    #[test]
    fn test_app_state_version() {
        assert!(!state().version.is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_store() {
        let state = Arc::new(state());
        state.store.lock().upsert_subject(1, None, None).unwrap();

        let Json(health) = health_check(State(state)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.store.map(|s| s.subjects), Some(1));
    }
}
