//! Dashboard API Endpoints
//!
//! REST API for dashboard functionality.

pub mod health;
pub mod subjects;

use axum::Router;
use std::sync::Arc;

use crate::pipeline::Pipeline;

pub use health::health_router;
pub use subjects::{subjects_router, ApiError, ErrorResponse, SubjectApiState};

/// Combined dashboard API state
#[derive(Clone)]
pub struct DashboardApiState {
    /// Health check state
    pub health: Arc<health::AppState>,
    /// Subject handlers
    pub subjects: Arc<SubjectApiState>,
}

impl DashboardApiState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            health: Arc::new(health::AppState::new(pipeline.store().clone())),
            subjects: Arc::new(SubjectApiState::new(pipeline)),
        }
    }
}

/// Create the full API router with all endpoints
///
/// Routes:
/// - GET /health - Health check with version, uptime and store totals
/// - GET /healthz - Liveness probe
/// - GET /readyz - Readiness probe
/// - /subjects/... - see [`subjects`]
pub fn api_router(state: DashboardApiState) -> Router {
    Router::new()
        .merge(health_router(state.health))
        .merge(subjects_router(state.subjects))
}
