//! Scan ledger queries
//!
//! The ledger is append-only: rows are inserted, never updated. The
//! one exception is the transfer operation, which tags existing rows
//! with a group label and changes no quantity.

use boxline_common::db::models::ScanEvent;
use boxline_common::events::ScanSource;
use boxline_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScanEvent> {
    let id: String = row.try_get("id")?;
    let job_id: String = row.try_get("job_id")?;
    let source: String = row.try_get("source")?;

    Ok(ScanEvent {
        id: super::parse_uuid(&id)?,
        job_id: super::parse_uuid(&job_id)?,
        box_number: row.try_get("box_number")?,
        bar_code: row.try_get("bar_code")?,
        worker_id: row.try_get("worker_id")?,
        quantity_delta: row.try_get("quantity_delta")?,
        source: ScanSource::from_str(&source)
            .ok_or_else(|| Error::Internal(format!("Unknown scan source: {}", source)))?,
        group_label: row.try_get("group_label")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

/// Append one event to the ledger, returning its id
#[allow(clippy::too_many_arguments)]
pub async fn append_event<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: Option<i64>,
    bar_code: &str,
    worker_id: &str,
    quantity_delta: i64,
    source: ScanSource,
) -> Result<Uuid>
where
    E: SqliteExecutor<'e>,
{
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO scan_events
            (id, job_id, box_number, bar_code, worker_id, quantity_delta, source, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(job_id.to_string())
    .bind(box_number)
    .bind(bar_code)
    .bind(worker_id)
    .bind(quantity_delta)
    .bind(source.as_str())
    .bind(Utc::now())
    .execute(db)
    .await?;

    Ok(id)
}

/// Tag all boxed events of a box with a transfer group label
pub async fn tag_box_events<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
    group_label: &str,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "UPDATE scan_events SET group_label = ? WHERE job_id = ? AND box_number = ?",
    )
    .bind(group_label)
    .bind(job_id.to_string())
    .bind(box_number)
    .execute(db)
    .await?;

    Ok(())
}

/// Net quantity for one (job, box, barcode) key derived from the ledger
///
/// This is the recomputable source of truth the materialized
/// scanned_qty must always agree with.
pub async fn ledger_sum<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
    bar_code: &str,
) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let sum: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(quantity_delta), 0)
        FROM scan_events
        WHERE job_id = ? AND box_number = ? AND bar_code = ?
        "#,
    )
    .bind(job_id.to_string())
    .bind(box_number)
    .bind(bar_code)
    .fetch_one(db)
    .await?;

    Ok(sum)
}

/// Most recent ledger entries for a job (audit read model)
pub async fn recent_events<'e, E>(db: E, job_id: Uuid, limit: i64) -> Result<Vec<ScanEvent>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM scan_events
        WHERE job_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(job_id.to_string())
    .bind(limit)
    .fetch_all(db)
    .await?;

    rows.iter().map(event_from_row).collect()
}
