//! Job queries
//!
//! Jobs arrive through the external import process; the engine only
//! toggles activation and reads lifecycle state.

use boxline_common::db::models::Job;
use boxline_common::events::JobStatus;
use boxline_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
    let guid: String = row.try_get("guid")?;
    let status: String = row.try_get("status")?;

    Ok(Job {
        guid: super::parse_uuid(&guid)?,
        name: row.try_get("name")?,
        active: row.try_get::<i64, _>("active")? != 0,
        status: JobStatus::from_str(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown job status: {}", status)))?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

/// Insert a new job (import boundary)
pub async fn insert_job<'e, E>(db: E, job_id: Uuid, name: &str) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO jobs (guid, name, active, status, created_at, updated_at)
        VALUES (?, ?, 1, 'active', ?, ?)
        "#,
    )
    .bind(job_id.to_string())
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(())
}

/// Fetch a job by id
pub async fn get_job<'e, E>(db: E, job_id: Uuid) -> Result<Option<Job>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT * FROM jobs WHERE guid = ?")
        .bind(job_id.to_string())
        .fetch_optional(db)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Fetch a job, failing NotFound when it doesn't exist
pub async fn require_job<'e, E>(db: E, job_id: Uuid) -> Result<Job>
where
    E: SqliteExecutor<'e>,
{
    get_job(db, job_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
}

/// Toggle the scanning-active flag
///
/// Returns the number of rows updated (0 when the job is unknown).
pub async fn set_job_active<'e, E>(db: E, job_id: Uuid, active: bool) -> Result<u64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE jobs SET active = ?, updated_at = ? WHERE guid = ?")
        .bind(active as i64)
        .bind(Utc::now())
        .bind(job_id.to_string())
        .execute(db)
        .await?;

    Ok(result.rows_affected())
}
