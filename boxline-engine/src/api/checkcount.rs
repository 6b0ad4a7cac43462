//! CheckCount verification session endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiResult;
use crate::AppState;
use boxline_common::db::models::{CheckCountSession, CheckProgress};

/// Body of POST /api/check-sessions
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub job_id: Uuid,
    pub box_number: i64,
    pub user_id: String,
}

/// POST /api/check-sessions
///
/// Starts a verification session for a box. At most one active
/// session per box; a second create is a conflict.
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<Json<CheckCountSession>> {
    let session = state
        .engine
        .create_check_session(req.job_id, req.box_number, &req.user_id)
        .await?;

    Ok(Json(session))
}

/// Session with its per-barcode progress
#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: CheckCountSession,
    pub progress: Vec<CheckProgress>,
}

/// GET /api/check-sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionDetail>> {
    let session = state.engine.check_session(session_id).await?;
    let progress = state.engine.check_session_progress(session_id).await?;

    Ok(Json(SessionDetail { session, progress }))
}

/// Body of POST /api/check-sessions/:session_id/scan
#[derive(Debug, Deserialize)]
pub struct CheckScanRequest {
    pub bar_code: String,
}

/// POST /api/check-sessions/:session_id/scan
///
/// Records one probe scan; only the session-local count changes.
pub async fn check_scan(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<CheckScanRequest>,
) -> ApiResult<Json<CheckProgress>> {
    let progress = state.engine.check_scan(session_id, &req.bar_code).await?;
    Ok(Json(progress))
}

/// Body of POST /api/check-sessions/:session_id/complete
#[derive(Debug, Deserialize)]
pub struct CompleteSessionRequest {
    #[serde(default)]
    pub apply_corrections: bool,
}

/// POST /api/check-sessions/:session_id/complete
///
/// Closes the session, applying corrections to live counts when
/// requested. Retrying returns the stored terminal state.
pub async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<CompleteSessionRequest>,
) -> ApiResult<Json<CheckCountSession>> {
    let session = state
        .engine
        .complete_check_session(session_id, req.apply_corrections)
        .await?;

    Ok(Json(session))
}
