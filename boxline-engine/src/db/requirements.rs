//! Box requirement queries
//!
//! `scanned_qty` updates are always guarded (`scanned_qty < required_qty`
//! or an explicit overwrite) so a lost race surfaces as zero rows
//! affected instead of an over-count.

use boxline_common::db::models::BoxRequirement;
use boxline_common::Result;
use chrono::Utc;
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

fn requirement_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BoxRequirement> {
    let job_id: String = row.try_get("job_id")?;

    Ok(BoxRequirement {
        job_id: super::parse_uuid(&job_id)?,
        box_number: row.try_get("box_number")?,
        bar_code: row.try_get("bar_code")?,
        product_name: row.try_get("product_name")?,
        customer_name: row.try_get("customer_name")?,
        required_qty: row.try_get("required_qty")?,
        scanned_qty: row.try_get("scanned_qty")?,
        group_label: row.try_get("group_label")?,
    })
}

/// Insert a requirement row (import boundary)
pub async fn insert_requirement<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
    bar_code: &str,
    product_name: &str,
    customer_name: &str,
    required_qty: i64,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO box_requirements
            (job_id, box_number, bar_code, product_name, customer_name,
             required_qty, scanned_qty, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(job_id.to_string())
    .bind(box_number)
    .bind(bar_code)
    .bind(product_name)
    .bind(customer_name)
    .bind(required_qty)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(())
}

/// Find the requirement row a scan should land in
///
/// Deterministic tie-break: lowest box number that still needs the
/// item wins, unless `preferred_box` (the worker's allocation hint)
/// still needs it, in which case the hint wins.
pub async fn find_candidate<'e, E>(
    db: E,
    job_id: Uuid,
    bar_code: &str,
    preferred_box: Option<i64>,
) -> Result<Option<BoxRequirement>>
where
    E: SqliteExecutor<'e>,
{
    // Single query: the preferred box sorts first when it qualifies,
    // everything else falls back to ascending box number.
    let row = sqlx::query(
        r#"
        SELECT * FROM box_requirements
        WHERE job_id = ? AND bar_code = ? AND scanned_qty < required_qty
        ORDER BY (box_number = ?) DESC, box_number ASC
        LIMIT 1
        "#,
    )
    .bind(job_id.to_string())
    .bind(bar_code)
    .bind(preferred_box.unwrap_or(-1))
    .fetch_optional(db)
    .await?;

    row.as_ref().map(requirement_from_row).transpose()
}

/// Guarded single-unit increment for one (box, barcode) key
///
/// Returns false when the guard failed (the row no longer needs the
/// item), in which case the caller re-selects a candidate.
pub async fn increment_scanned<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
    bar_code: &str,
) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE box_requirements
        SET scanned_qty = scanned_qty + 1, updated_at = ?
        WHERE job_id = ? AND box_number = ? AND bar_code = ?
          AND scanned_qty < required_qty
        "#,
    )
    .bind(Utc::now())
    .bind(job_id.to_string())
    .bind(box_number)
    .bind(bar_code)
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Add a quantity to a key, guarded by remaining capacity
///
/// Used by put-aside reallocation; returns false when the target box
/// no longer needs that many units.
pub async fn add_scanned<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
    bar_code: &str,
    quantity: i64,
) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE box_requirements
        SET scanned_qty = scanned_qty + ?, updated_at = ?
        WHERE job_id = ? AND box_number = ? AND bar_code = ?
          AND scanned_qty + ? <= required_qty
        "#,
    )
    .bind(quantity)
    .bind(Utc::now())
    .bind(job_id.to_string())
    .bind(box_number)
    .bind(bar_code)
    .bind(quantity)
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Overwrite the live quantity for one key (CheckCount corrections)
pub async fn set_scanned<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
    bar_code: &str,
    scanned_qty: i64,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE box_requirements
        SET scanned_qty = ?, updated_at = ?
        WHERE job_id = ? AND box_number = ? AND bar_code = ?
        "#,
    )
    .bind(scanned_qty)
    .bind(Utc::now())
    .bind(job_id.to_string())
    .bind(box_number)
    .bind(bar_code)
    .execute(db)
    .await?;

    Ok(())
}

/// Zero every row of a box (emptyBox reset)
pub async fn zero_box<'e, E>(db: E, job_id: Uuid, box_number: i64) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE box_requirements
        SET scanned_qty = 0, updated_at = ?
        WHERE job_id = ? AND box_number = ?
        "#,
    )
    .bind(Utc::now())
    .bind(job_id.to_string())
    .bind(box_number)
    .execute(db)
    .await?;

    Ok(())
}

/// Tag all rows of a box with a transfer group label
pub async fn tag_box_group<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
    group_label: &str,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE box_requirements
        SET group_label = ?, updated_at = ?
        WHERE job_id = ? AND box_number = ?
        "#,
    )
    .bind(group_label)
    .bind(Utc::now())
    .bind(job_id.to_string())
    .bind(box_number)
    .execute(db)
    .await?;

    Ok(())
}

/// All requirement rows of one box, ordered by barcode
pub async fn fetch_box_rows<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
) -> Result<Vec<BoxRequirement>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        "SELECT * FROM box_requirements WHERE job_id = ? AND box_number = ? ORDER BY bar_code",
    )
    .bind(job_id.to_string())
    .bind(box_number)
    .fetch_all(db)
    .await?;

    rows.iter().map(requirement_from_row).collect()
}

/// All requirement rows of a job, ordered by box then barcode
pub async fn fetch_job_rows<'e, E>(db: E, job_id: Uuid) -> Result<Vec<BoxRequirement>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        "SELECT * FROM box_requirements WHERE job_id = ? ORDER BY box_number, bar_code",
    )
    .bind(job_id.to_string())
    .fetch_all(db)
    .await?;

    rows.iter().map(requirement_from_row).collect()
}

/// Whether a box is complete: at least one requirement row and no row
/// still short of its required quantity
pub async fn box_is_complete<'e, E>(db: E, job_id: Uuid, box_number: i64) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let (total, short): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(CASE WHEN scanned_qty < required_qty THEN 1 ELSE 0 END), 0)
        FROM box_requirements
        WHERE job_id = ? AND box_number = ?
        "#,
    )
    .bind(job_id.to_string())
    .bind(box_number)
    .fetch_one(db)
    .await?;

    Ok(total > 0 && short == 0)
}

/// Metadata lookup for a barcode anywhere in the job (for put-aside)
pub async fn any_row_for_barcode<'e, E>(
    db: E,
    job_id: Uuid,
    bar_code: &str,
) -> Result<Option<BoxRequirement>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        SELECT * FROM box_requirements
        WHERE job_id = ? AND bar_code = ?
        ORDER BY box_number ASC
        LIMIT 1
        "#,
    )
    .bind(job_id.to_string())
    .bind(bar_code)
    .fetch_optional(db)
    .await?;

    row.as_ref().map(requirement_from_row).transpose()
}

/// One requirement row by full key
pub async fn get_row<'e, E>(
    db: E,
    job_id: Uuid,
    box_number: i64,
    bar_code: &str,
) -> Result<Option<BoxRequirement>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT * FROM box_requirements WHERE job_id = ? AND box_number = ? AND bar_code = ?",
    )
    .bind(job_id.to_string())
    .bind(box_number)
    .bind(bar_code)
    .fetch_optional(db)
    .await?;

    row.as_ref().map(requirement_from_row).transpose()
}
