//! Read models: job snapshot and scan ledger

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiResult;
use crate::db::{jobs, ledger, requirements};
use crate::AppState;
use boxline_common::db::get_setting_i64;
use boxline_common::db::models::{BoxRequirement, Job, ScanEvent};

/// Per-box slice of the snapshot
#[derive(Debug, Serialize)]
pub struct BoxSnapshot {
    pub box_number: i64,
    pub customer_name: String,
    /// Set when the box was transferred to a group
    pub group_label: Option<String>,
    pub required_total: i64,
    pub scanned_total: i64,
    pub is_complete: bool,
    pub lines: Vec<BoxRequirement>,
}

/// Full per-job snapshot for dashboards
#[derive(Debug, Serialize)]
pub struct JobSnapshot {
    pub job: Job,
    pub boxes: Vec<BoxSnapshot>,
}

/// GET /api/jobs/:job_id/snapshot
///
/// Current state of every box in the job, grouped and totalled. This
/// is the polling fallback for clients not on the SSE feed.
pub async fn job_snapshot(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobSnapshot>> {
    let pool = state.engine.pool();
    let job = jobs::require_job(pool, job_id).await?;
    let rows = requirements::fetch_job_rows(pool, job_id).await?;

    let mut boxes: Vec<BoxSnapshot> = Vec::new();
    for row in rows {
        // Rows arrive ordered by box number, so the current box is
        // always the last snapshot entry
        let needs_new = boxes
            .last()
            .map(|b| b.box_number != row.box_number)
            .unwrap_or(true);
        if needs_new {
            boxes.push(BoxSnapshot {
                box_number: row.box_number,
                customer_name: row.customer_name.clone(),
                group_label: row.group_label.clone(),
                required_total: 0,
                scanned_total: 0,
                is_complete: true,
                lines: Vec::new(),
            });
        }

        let entry = boxes.last_mut().ok_or_else(|| {
            boxline_common::Error::Internal("snapshot grouping lost its entry".to_string())
        })?;
        entry.required_total += row.required_qty;
        entry.scanned_total += row.scanned_qty;
        entry.is_complete &= row.scanned_qty >= row.required_qty;
        entry.lines.push(row);
    }

    Ok(Json(JobSnapshot { job, boxes }))
}

/// Query parameters for the ledger endpoint
#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    /// Maximum entries to return; defaults to the ledger_page_size
    /// setting
    pub limit: Option<i64>,
}

/// GET /api/jobs/:job_id/ledger
///
/// Most recent scan ledger entries, newest first.
pub async fn job_ledger(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> ApiResult<Json<Vec<ScanEvent>>> {
    let pool = state.engine.pool();
    jobs::require_job(pool, job_id).await?;

    let default_limit = get_setting_i64(pool, "ledger_page_size", 100).await?;
    let limit = query.limit.unwrap_or(default_limit).clamp(1, 1000);

    let events = ledger::recent_events(pool, job_id, limit).await?;
    Ok(Json(events))
}
