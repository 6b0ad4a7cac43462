//! Box history queries (append-only audit trail)

use boxline_common::db::models::BoxHistoryEntry;
use boxline_common::events::BoxAction;
use boxline_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BoxHistoryEntry> {
    let id: String = row.try_get("id")?;
    let job_id: String = row.try_get("job_id")?;
    let action: String = row.try_get("action")?;

    Ok(BoxHistoryEntry {
        id: super::parse_uuid(&id)?,
        job_id: super::parse_uuid(&job_id)?,
        box_number: row.try_get("box_number")?,
        action: BoxAction::from_str(&action)
            .ok_or_else(|| Error::Internal(format!("Unknown box action: {}", action)))?,
        performed_by: row.try_get("performed_by")?,
        target_group: row.try_get("target_group")?,
        reason: row.try_get("reason")?,
        items_processed: row.try_get("items_processed")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

/// Append one audit entry, returning it as stored
#[allow(clippy::too_many_arguments)]
pub async fn insert_entry<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
    action: BoxAction,
    performed_by: &str,
    target_group: Option<&str>,
    reason: Option<&str>,
    items_processed: i64,
) -> Result<BoxHistoryEntry>
where
    E: SqliteExecutor<'e>,
{
    let id = Uuid::new_v4();
    let created_at = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO box_history
            (id, job_id, box_number, action, performed_by, target_group, reason,
             items_processed, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(job_id.to_string())
    .bind(box_number)
    .bind(action.as_str())
    .bind(performed_by)
    .bind(target_group)
    .bind(reason)
    .bind(items_processed)
    .bind(created_at)
    .execute(db)
    .await?;

    Ok(BoxHistoryEntry {
        id,
        job_id,
        box_number,
        action,
        performed_by: performed_by.to_string(),
        target_group: target_group.map(str::to_string),
        reason: reason.map(str::to_string),
        items_processed,
        created_at,
    })
}

/// History of one box, newest first
pub async fn list_box_history<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
) -> Result<Vec<BoxHistoryEntry>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM box_history
        WHERE job_id = ? AND box_number = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(job_id.to_string())
    .bind(box_number)
    .fetch_all(db)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

/// Ensure a transfer group exists (created on first transfer into it)
pub async fn ensure_transfer_group<'e, E>(
    db: E,
    job_id: Uuid,
    name: &str,
    created_by: &str,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT OR IGNORE INTO transfer_groups (job_id, name, created_by, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(job_id.to_string())
    .bind(name)
    .bind(created_by)
    .bind(Utc::now())
    .execute(db)
    .await?;

    Ok(())
}
