//! Box lifecycle endpoints: empty, transfer, history

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::ApiResult;
use crate::AppState;
use boxline_common::db::models::BoxHistoryEntry;

/// Body of POST /api/jobs/:job_id/boxes/:box_number/empty
#[derive(Debug, Deserialize)]
pub struct EmptyBoxRequest {
    pub performed_by: String,
    pub reason: Option<String>,
}

/// POST /api/jobs/:job_id/boxes/:box_number/empty
///
/// Resets the box's scanned quantities for reallocation, writing
/// compensating ledger entries and one audit record.
pub async fn empty_box(
    State(state): State<AppState>,
    Path((job_id, box_number)): Path<(Uuid, i64)>,
    Json(req): Json<EmptyBoxRequest>,
) -> ApiResult<Json<BoxHistoryEntry>> {
    let entry = state
        .engine
        .empty_box(job_id, box_number, &req.performed_by, req.reason.as_deref())
        .await?;

    Ok(Json(entry))
}

/// Body of POST /api/jobs/:job_id/boxes/:box_number/transfer
#[derive(Debug, Deserialize)]
pub struct TransferBoxRequest {
    pub target_group: String,
    pub performed_by: String,
    pub reason: Option<String>,
}

/// POST /api/jobs/:job_id/boxes/:box_number/transfer
///
/// Reassigns the box's contents to a named group, creating the group
/// on first use. Quantities are unchanged.
pub async fn transfer_box(
    State(state): State<AppState>,
    Path((job_id, box_number)): Path<(Uuid, i64)>,
    Json(req): Json<TransferBoxRequest>,
) -> ApiResult<Json<BoxHistoryEntry>> {
    let entry = state
        .engine
        .transfer_box(
            job_id,
            box_number,
            &req.target_group,
            &req.performed_by,
            req.reason.as_deref(),
        )
        .await?;

    Ok(Json(entry))
}

/// GET /api/jobs/:job_id/boxes/:box_number/history
pub async fn box_history(
    State(state): State<AppState>,
    Path((job_id, box_number)): Path<(Uuid, i64)>,
) -> ApiResult<Json<Vec<BoxHistoryEntry>>> {
    let entries = state.engine.box_history(job_id, box_number).await?;
    Ok(Json(entries))
}
