//! CheckCount session and progress queries
//!
//! Progress rows are session-local: they snapshot the live counts at
//! session start and accumulate check scans in isolation.

use boxline_common::db::models::{CheckCountSession, CheckProgress};
use boxline_common::events::SessionStatus;
use boxline_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CheckCountSession> {
    let id: String = row.try_get("id")?;
    let job_id: String = row.try_get("job_id")?;
    let status: String = row.try_get("status")?;

    Ok(CheckCountSession {
        id: super::parse_uuid(&id)?,
        job_id: super::parse_uuid(&job_id)?,
        box_number: row.try_get("box_number")?,
        user_id: row.try_get("user_id")?,
        status: SessionStatus::from_str(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown session status: {}", status)))?,
        started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        total_items_expected: row.try_get("total_items_expected")?,
        total_items_scanned: row.try_get("total_items_scanned")?,
        discrepancies_found: row.try_get("discrepancies_found")?,
        corrections_applied: row.try_get::<i64, _>("corrections_applied")? != 0,
    })
}

fn progress_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CheckProgress> {
    let session_id: String = row.try_get("session_id")?;

    Ok(CheckProgress {
        session_id: super::parse_uuid(&session_id)?,
        bar_code: row.try_get("bar_code")?,
        product_name: row.try_get("product_name")?,
        expected_qty: row.try_get("expected_qty")?,
        original_scanned_qty: row.try_get("original_scanned_qty")?,
        check_scanned_qty: row.try_get("check_scanned_qty")?,
        extra_items: row.try_get("extra_items")?,
        has_discrepancy: row.try_get::<i64, _>("has_discrepancy")? != 0,
    })
}

/// Active session for a box, if any
pub async fn active_session_for_box<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
) -> Result<Option<CheckCountSession>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT * FROM check_sessions WHERE job_id = ? AND box_number = ? AND status = 'active'",
    )
    .bind(job_id.to_string())
    .bind(box_number)
    .fetch_optional(db)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Insert a new active session
pub async fn insert_session<'e, E>(
    db: E,
    session_id: Uuid,
    job_id: Uuid,
    box_number: i64,
    user_id: &str,
    total_items_expected: i64,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO check_sessions
            (id, job_id, box_number, user_id, status, started_at, total_items_expected)
        VALUES (?, ?, ?, ?, 'active', ?, ?)
        "#,
    )
    .bind(session_id.to_string())
    .bind(job_id.to_string())
    .bind(box_number)
    .bind(user_id)
    .bind(Utc::now())
    .bind(total_items_expected)
    .execute(db)
    .await?;

    Ok(())
}

/// Snapshot one progress row at session start
pub async fn insert_progress<'e, E>(
    db: E,
    session_id: Uuid,
    bar_code: &str,
    product_name: &str,
    expected_qty: i64,
    original_scanned_qty: i64,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO check_progress
            (session_id, bar_code, product_name, expected_qty, original_scanned_qty,
             check_scanned_qty, extra_items, has_discrepancy)
        VALUES (?, ?, ?, ?, ?, 0, 0, 0)
        "#,
    )
    .bind(session_id.to_string())
    .bind(bar_code)
    .bind(product_name)
    .bind(expected_qty)
    .bind(original_scanned_qty)
    .execute(db)
    .await?;

    Ok(())
}

/// Fetch a session by id
pub async fn get_session<'e, E>(db: E, session_id: Uuid) -> Result<Option<CheckCountSession>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT * FROM check_sessions WHERE id = ?")
        .bind(session_id.to_string())
        .fetch_optional(db)
        .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Fetch a session, failing NotFound when unknown
pub async fn require_session<'e, E>(db: E, session_id: Uuid) -> Result<CheckCountSession>
where
    E: SqliteExecutor<'e>,
{
    get_session(db, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("check session {}", session_id)))
}

/// One progress row by (session, barcode)
pub async fn get_progress<'e, E>(
    db: E,
    session_id: Uuid,
    bar_code: &str,
) -> Result<Option<CheckProgress>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT * FROM check_progress WHERE session_id = ? AND bar_code = ?")
        .bind(session_id.to_string())
        .bind(bar_code)
        .fetch_optional(db)
        .await?;

    row.as_ref().map(progress_from_row).transpose()
}

/// All progress rows of a session, ordered by barcode
pub async fn list_progress<'e, E>(db: E, session_id: Uuid) -> Result<Vec<CheckProgress>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query("SELECT * FROM check_progress WHERE session_id = ? ORDER BY bar_code")
        .bind(session_id.to_string())
        .fetch_all(db)
        .await?;

    rows.iter().map(progress_from_row).collect()
}

/// Overwrite the mutable counters of one progress row
pub async fn update_progress<'e, E>(
    db: E,
    session_id: Uuid,
    bar_code: &str,
    check_scanned_qty: i64,
    extra_items: i64,
    has_discrepancy: bool,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE check_progress
        SET check_scanned_qty = ?, extra_items = ?, has_discrepancy = ?
        WHERE session_id = ? AND bar_code = ?
        "#,
    )
    .bind(check_scanned_qty)
    .bind(extra_items)
    .bind(has_discrepancy as i64)
    .bind(session_id.to_string())
    .bind(bar_code)
    .execute(db)
    .await?;

    Ok(())
}

/// Update session running totals after a check scan
pub async fn update_session_totals<'e, E>(
    db: E,
    session_id: Uuid,
    total_items_scanned: i64,
    discrepancies_found: i64,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "UPDATE check_sessions SET total_items_scanned = ?, discrepancies_found = ? WHERE id = ?",
    )
    .bind(total_items_scanned)
    .bind(discrepancies_found)
    .bind(session_id.to_string())
    .execute(db)
    .await?;

    Ok(())
}

/// Guarded active→completed transition (the idempotency key for
/// `complete`); returns false when the session was already completed
pub async fn mark_completed<'e, E>(
    db: E,
    session_id: Uuid,
    discrepancies_found: i64,
    corrections_applied: bool,
) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE check_sessions
        SET status = 'completed', completed_at = ?, discrepancies_found = ?,
            corrections_applied = ?
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(Utc::now())
    .bind(discrepancies_found)
    .bind(corrections_applied as i64)
    .bind(session_id.to_string())
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}
