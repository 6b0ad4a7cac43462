//! Put-aside listing and reallocation endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::ApiResult;
use crate::AppState;
use boxline_common::db::models::PutAsideItem;

/// GET /api/jobs/:job_id/put-aside
pub async fn list_put_aside(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PutAsideItem>>> {
    let items = state.engine.list_put_aside(job_id).await?;
    Ok(Json(items))
}

/// Body of POST /api/put-aside/:item_id/reallocate
#[derive(Debug, Deserialize)]
pub struct ReallocateRequest {
    pub target_box_number: i64,
    pub performed_by: String,
}

/// POST /api/put-aside/:item_id/reallocate
///
/// Moves a pending item into a box that still needs it. A retried
/// identical request returns the same terminal state; a different
/// target for an already-consumed item is a conflict.
pub async fn reallocate(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<ReallocateRequest>,
) -> ApiResult<Json<PutAsideItem>> {
    let item = state
        .engine
        .reallocate(item_id, req.target_box_number, &req.performed_by)
        .await?;

    Ok(Json(item))
}
