//! Put-aside item queries

use boxline_common::db::models::PutAsideItem;
use boxline_common::events::PutAsideStatus;
use boxline_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PutAsideItem> {
    let id: String = row.try_get("id")?;
    let job_id: String = row.try_get("job_id")?;
    let status: String = row.try_get("status")?;
    let source_event_id: String = row.try_get("source_event_id")?;

    Ok(PutAsideItem {
        id: super::parse_uuid(&id)?,
        job_id: super::parse_uuid(&job_id)?,
        bar_code: row.try_get("bar_code")?,
        product_name: row.try_get("product_name")?,
        customer_name: row.try_get("customer_name")?,
        original_box_number: row.try_get("original_box_number")?,
        quantity: row.try_get("quantity")?,
        status: PutAsideStatus::from_str(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown put-aside status: {}", status)))?,
        put_aside_by: row.try_get("put_aside_by")?,
        put_aside_at: row.try_get::<DateTime<Utc>, _>("put_aside_at")?,
        reallocated_by: row.try_get("reallocated_by")?,
        reallocated_at: row.try_get::<Option<DateTime<Utc>>, _>("reallocated_at")?,
        reallocated_to_box_number: row.try_get("reallocated_to_box_number")?,
        source_event_id: super::parse_uuid(&source_event_id)?,
    })
}

/// Insert a pending put-aside item
#[allow(clippy::too_many_arguments)]
pub async fn insert_item<'e, E>(
    db: E,
    job_id: Uuid,
    bar_code: &str,
    product_name: &str,
    customer_name: &str,
    original_box_number: Option<i64>,
    quantity: i64,
    put_aside_by: &str,
    source_event_id: Uuid,
) -> Result<Uuid>
where
    E: SqliteExecutor<'e>,
{
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO put_aside_items
            (id, job_id, bar_code, product_name, customer_name, original_box_number,
             quantity, status, put_aside_by, put_aside_at, source_event_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(job_id.to_string())
    .bind(bar_code)
    .bind(product_name)
    .bind(customer_name)
    .bind(original_box_number)
    .bind(quantity)
    .bind(put_aside_by)
    .bind(Utc::now())
    .bind(source_event_id.to_string())
    .execute(db)
    .await?;

    Ok(id)
}

/// Fetch one item by id
pub async fn get_item<'e, E>(db: E, item_id: Uuid) -> Result<Option<PutAsideItem>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT * FROM put_aside_items WHERE id = ?")
        .bind(item_id.to_string())
        .fetch_optional(db)
        .await?;

    row.as_ref().map(item_from_row).transpose()
}

/// Guarded pending→reallocated transition (the exactly-once dedup key)
///
/// Returns false when the item was not pending, i.e. a concurrent or
/// repeated reallocation already consumed it.
pub async fn mark_reallocated<'e, E>(
    db: E,
    item_id: Uuid,
    target_box_number: i64,
    performed_by: &str,
) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE put_aside_items
        SET status = 'reallocated', reallocated_by = ?, reallocated_at = ?,
            reallocated_to_box_number = ?
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(performed_by)
    .bind(Utc::now())
    .bind(target_box_number)
    .bind(item_id.to_string())
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// All put-aside items of a job, pending first, newest first within status
pub async fn list_items<'e, E>(db: E, job_id: Uuid) -> Result<Vec<PutAsideItem>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM put_aside_items
        WHERE job_id = ?
        ORDER BY (status = 'pending') DESC, put_aside_at DESC
        "#,
    )
    .bind(job_id.to_string())
    .fetch_all(db)
    .await?;

    rows.iter().map(item_from_row).collect()
}
