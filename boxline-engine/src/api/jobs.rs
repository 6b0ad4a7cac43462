//! Job import and activation endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::ApiResult;
use crate::engine::JobImport;
use crate::AppState;
use boxline_common::db::models::Job;

/// POST /api/jobs
///
/// Imports a batch of customer orders as a new job. The batch must map
/// boxes and customers one-to-one.
pub async fn import_job(
    State(state): State<AppState>,
    Json(import): Json<JobImport>,
) -> ApiResult<Json<Job>> {
    let job = state.engine.import_job(&import).await?;
    Ok(Json(job))
}

/// Body of POST /api/jobs/:job_id/active
#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// POST /api/jobs/:job_id/active
///
/// Pauses or resumes scanning for a job. While paused, scans are
/// rejected outright rather than put aside.
pub async fn set_job_active(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<SetActiveRequest>,
) -> ApiResult<Json<Value>> {
    state.engine.set_job_active(job_id, req.active).await?;
    Ok(Json(json!({ "job_id": job_id, "active": req.active })))
}
