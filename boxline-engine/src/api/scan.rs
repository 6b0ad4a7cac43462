//! Scan intake endpoint

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::ApiResult;
use crate::engine::ScanResult;
use crate::AppState;

/// Body of POST /api/scan
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub job_id: Uuid,
    pub bar_code: String,
    pub worker_id: String,
    /// Allocation hint: box the worker is currently filling
    pub preferred_box: Option<i64>,
}

/// POST /api/scan
///
/// Records one scanned unit. A put-aside outcome is a 200 with
/// `put_aside: true`; only a paused job or bad input is an error.
pub async fn record_scan(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> ApiResult<Json<ScanResult>> {
    let result = state
        .engine
        .record_scan(req.job_id, &req.bar_code, &req.worker_id, req.preferred_box)
        .await?;

    Ok(Json(result))
}
