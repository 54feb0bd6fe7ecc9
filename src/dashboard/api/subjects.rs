//! Subject API
//!
//! Per-subject snapshots and operator controls:
//!
//! - GET  /subjects                    list with flags and last score
//! - GET  /subjects/{id}               subject record
//! - GET  /subjects/{id}/chat          full history
//! - GET  /subjects/{id}/facts         facts grouped by category
//! - GET  /subjects/{id}/score         stored lead score (?refresh=true recomputes)
//! - GET  /subjects/{id}/contacts      mentioned contacts
//! - GET  /subjects/{id}/signals       lead signals
//! - GET  /subjects/{id}/chat_data     combined poll for the chat view
//! - POST /subjects/{id}/toggle_active
//! - POST /subjects/{id}/toggle_human
//! - PUT  /subjects/{id}/quiet_hours   {start_hour, end_hour}
//! - POST /subjects/{id}/messages      {text} manual send
//! - POST /subjects/{id}/trigger       proactive message

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::facts::{FactSnapshot, LEAD_PERSONA_KEY, LEAD_SCORE_KEY};
use crate::pipeline::{Pipeline, ProactiveOutcome};
use crate::store::{StoredMessage, Subject};

/// State for subject handlers
pub struct SubjectApiState {
    pub pipeline: Arc<Pipeline>,
}

impl SubjectApiState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

/// Handler failure mapped to a status code
#[derive(Debug)]
pub enum ApiError {
    NotFound(i64),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Subject {} not found", id),
            ),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
            Self::Internal(e) => {
                tracing::error!("Dashboard request failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
            }
        };
        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Subject list entry
#[derive(Debug, Serialize)]
pub struct SubjectListItem {
    pub id: i64,
    pub name: String,
    pub username: Option<String>,
    pub active: bool,
    pub human_mode: bool,
    pub last_activity: i64,
    pub lead_score: Option<f64>,
    pub lead_persona: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubjectListResponse {
    pub subjects: Vec<SubjectListItem>,
    pub total: usize,
}

/// Combined chat view snapshot
#[derive(Debug, Serialize)]
pub struct ChatDataResponse {
    pub messages: Vec<StoredMessage>,
    pub facts: FactSnapshot,
    pub is_active: bool,
    pub is_human: bool,
    pub quiet_start: u8,
    pub quiet_end: u8,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub success: bool,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuietHoursRequest {
    pub start_hour: i64,
    pub end_hour: i64,
}

#[derive(Debug, Serialize)]
pub struct QuietHoursResponse {
    pub success: bool,
    pub start_hour: u8,
    pub end_hour: u8,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn require_subject(state: &SubjectApiState, id: i64) -> Result<Subject, ApiError> {
    state
        .pipeline
        .store()
        .lock()
        .get_subject(id)?
        .ok_or(ApiError::NotFound(id))
}

fn hour(value: i64, name: &str) -> Result<u8, ApiError> {
    u8::try_from(value)
        .ok()
        .filter(|h| *h <= 23)
        .ok_or_else(|| ApiError::BadRequest(format!("{} must be 0-23, got {}", name, value)))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/subjects
pub async fn list_subjects(State(state): State<Arc<SubjectApiState>>) -> ApiResult<SubjectListResponse> {
    let store = state.pipeline.store().lock();
    let mut subjects = Vec::new();

    for subject in store.list_subjects()? {
        let scores = store.fact_snapshot(subject.id)?.scores;
        subjects.push(SubjectListItem {
            id: subject.id,
            name: subject.display_name(),
            username: subject.username.clone(),
            active: subject.active,
            human_mode: subject.human_mode,
            last_activity: subject.last_activity,
            lead_score: scores.get(LEAD_SCORE_KEY).and_then(|s| s.parse().ok()),
            lead_persona: scores.get(LEAD_PERSONA_KEY).cloned(),
        });
    }

    let total = subjects.len();
    Ok(Json(SubjectListResponse { subjects, total }))
}

/// GET /api/subjects/{id}
pub async fn get_subject(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
) -> ApiResult<Subject> {
    Ok(Json(require_subject(&state, id)?))
}

/// GET /api/subjects/{id}/chat
pub async fn get_chat(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<StoredMessage>> {
    require_subject(&state, id)?;
    Ok(Json(state.pipeline.store().lock().full_chat(id)?))
}

/// GET /api/subjects/{id}/facts
pub async fn get_facts(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
) -> ApiResult<FactSnapshot> {
    require_subject(&state, id)?;
    Ok(Json(state.pipeline.store().lock().fact_snapshot(id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScoreQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// GET /api/subjects/{id}/score
///
/// Serves the score persisted by the last turn. Recomputes (and persists)
/// only on `?refresh=true` or when the subject was never scored.
pub async fn get_score(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
    Query(query): Query<ScoreQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_subject(&state, id)?;

    if !query.refresh {
        if let Some((score, persona)) = state.pipeline.stored_score(id)? {
            return Ok(Json(serde_json::json!({
                "score": score,
                "level": score.round().clamp(0.0, 10.0) as u8,
                "persona": persona,
                "reasoning": null,
                "breakdown": null,
                "stored": true,
            })));
        }
    }

    let result = state.pipeline.score_subject(id).await?;
    Ok(Json(serde_json::json!({
        "score": result.score,
        "level": result.level(),
        "persona": result.persona,
        "reasoning": result.reasoning,
        "breakdown": result.breakdown,
        "stored": false,
    })))
}

/// GET /api/subjects/{id}/contacts
pub async fn get_contacts(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<crate::store::Contact>> {
    require_subject(&state, id)?;
    Ok(Json(state.pipeline.store().lock().contacts(id)?))
}

/// GET /api/subjects/{id}/signals
pub async fn get_signals(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<crate::store::LeadSignal>> {
    require_subject(&state, id)?;
    Ok(Json(state.pipeline.store().lock().signals(id)?))
}

/// GET /api/subjects/{id}/chat_data
pub async fn get_chat_data(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
) -> ApiResult<ChatDataResponse> {
    let subject = require_subject(&state, id)?;
    let store = state.pipeline.store().lock();
    Ok(Json(ChatDataResponse {
        messages: store.full_chat(id)?,
        facts: store.fact_snapshot(id)?,
        is_active: subject.active,
        is_human: subject.human_mode,
        quiet_start: subject.quiet_start,
        quiet_end: subject.quiet_end,
    }))
}

/// POST /api/subjects/{id}/toggle_active
pub async fn toggle_active(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
) -> ApiResult<ToggleResponse> {
    let enabled = state
        .pipeline
        .store()
        .lock()
        .toggle_active(id)?
        .ok_or(ApiError::NotFound(id))?;
    tracing::info!("Subject {} active: {}", id, enabled);
    Ok(Json(ToggleResponse {
        success: true,
        enabled,
    }))
}

/// POST /api/subjects/{id}/toggle_human
pub async fn toggle_human(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
) -> ApiResult<ToggleResponse> {
    let enabled = state
        .pipeline
        .store()
        .lock()
        .toggle_human_mode(id)?
        .ok_or(ApiError::NotFound(id))?;
    tracing::info!("Subject {} human mode: {}", id, enabled);
    Ok(Json(ToggleResponse {
        success: true,
        enabled,
    }))
}

/// PUT /api/subjects/{id}/quiet_hours
pub async fn set_quiet_hours(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
    Json(req): Json<QuietHoursRequest>,
) -> ApiResult<QuietHoursResponse> {
    let start = hour(req.start_hour, "start_hour")?;
    let end = hour(req.end_hour, "end_hour")?;

    if !state.pipeline.store().lock().set_quiet_hours(id, start, end)? {
        return Err(ApiError::NotFound(id));
    }
    tracing::info!("Subject {} quiet hours: {}-{}", id, start, end);
    Ok(Json(QuietHoursResponse {
        success: true,
        start_hour: start,
        end_hour: end,
    }))
}

/// POST /api/subjects/{id}/messages
pub async fn send_message(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<ActionResponse> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }
    require_subject(&state, id)?;

    state.pipeline.send_manual(id, text).await?;
    Ok(Json(ActionResponse {
        success: true,
        text: Some(text.to_string()),
        error: None,
    }))
}

/// POST /api/subjects/{id}/trigger
pub async fn trigger(
    State(state): State<Arc<SubjectApiState>>,
    Path(id): Path<i64>,
) -> ApiResult<ActionResponse> {
    match state.pipeline.trigger_proactive(id).await? {
        ProactiveOutcome::Sent(text) => Ok(Json(ActionResponse {
            success: true,
            text: Some(text),
            error: None,
        })),
        ProactiveOutcome::ModelFailed(error) => Ok(Json(ActionResponse {
            success: false,
            text: None,
            error: Some(error),
        })),
        ProactiveOutcome::UnknownSubject => Err(ApiError::NotFound(id)),
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the subjects API router
pub fn subjects_router(state: Arc<SubjectApiState>) -> Router {
    Router::new()
        .route("/subjects", get(list_subjects))
        .route("/subjects/{id}", get(get_subject))
        .route("/subjects/{id}/chat", get(get_chat))
        .route("/subjects/{id}/facts", get(get_facts))
        .route("/subjects/{id}/score", get(get_score))
        .route("/subjects/{id}/contacts", get(get_contacts))
        .route("/subjects/{id}/signals", get(get_signals))
        .route("/subjects/{id}/chat_data", get(get_chat_data))
        .route("/subjects/{id}/toggle_active", post(toggle_active))
        .route("/subjects/{id}/toggle_human", post(toggle_human))
        .route("/subjects/{id}/quiet_hours", put(set_quiet_hours))
        .route("/subjects/{id}/messages", post(send_message))
        .route("/subjects/{id}/trigger", post(trigger))
        .with_state(state)
}

// ============================================================================
// Tests
// ============================================================================
