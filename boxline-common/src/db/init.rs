//! Database initialization
//!
//! Creates the Boxline schema idempotently on startup. The scan ledger
//! table is append-only; requirement rows carry the materialized
//! scanned_qty that every mutating operation keeps in step with the
//! ledger inside one transaction.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer; scan traffic from
    // many workers funnels through short single-writer transactions
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    // Default busy timeout; re-applied from settings below
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_settings_table(&pool).await?;
    create_jobs_table(&pool).await?;
    create_box_requirements_table(&pool).await?;
    create_scan_events_table(&pool).await?;
    create_put_aside_items_table(&pool).await?;
    create_check_sessions_table(&pool).await?;
    create_check_progress_table(&pool).await?;
    create_box_history_table(&pool).await?;
    create_transfer_groups_table(&pool).await?;

    init_default_settings(&pool).await?;

    // Apply configurable busy timeout from settings; shorter lock waits
    // let the engine's bounded retry loop handle contention instead
    let timeout_ms: i64 = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'db_busy_timeout_ms'",
    )
    .fetch_optional(&pool)
    .await?
    .unwrap_or(5000);

    let pragma_sql = format!("PRAGMA busy_timeout = {}", timeout_ms);
    sqlx::query(&pragma_sql).execute(&pool).await?;

    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

/// Create the settings table
///
/// Stores engine configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('pending', 'active', 'completed', 'archived')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the box_requirements table
///
/// One row per (job, box, barcode). required_qty is fixed at import;
/// scanned_qty is the materialized aggregate over scan_events.
pub async fn create_box_requirements_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS box_requirements (
            job_id TEXT NOT NULL REFERENCES jobs(guid) ON DELETE CASCADE,
            box_number INTEGER NOT NULL,
            bar_code TEXT NOT NULL,
            product_name TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            required_qty INTEGER NOT NULL,
            scanned_qty INTEGER NOT NULL DEFAULT 0,
            group_label TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (job_id, box_number, bar_code),
            CHECK (required_qty >= 0),
            CHECK (scanned_qty >= 0),
            CHECK (box_number > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_box_requirements_barcode ON box_requirements(job_id, bar_code)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the scan_events table (append-only scan ledger)
pub async fn create_scan_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_events (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES jobs(guid) ON DELETE CASCADE,
            box_number INTEGER,
            bar_code TEXT NOT NULL,
            worker_id TEXT NOT NULL,
            quantity_delta INTEGER NOT NULL,
            source TEXT NOT NULL CHECK (source IN ('scan', 'correction', 'checkcount')),
            group_label TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scan_events_key ON scan_events(job_id, box_number, bar_code)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scan_events_created ON scan_events(job_id, created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_put_aside_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS put_aside_items (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES jobs(guid) ON DELETE CASCADE,
            bar_code TEXT NOT NULL,
            product_name TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            original_box_number INTEGER,
            quantity INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'reallocated')),
            put_aside_by TEXT NOT NULL,
            put_aside_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            reallocated_by TEXT,
            reallocated_at TIMESTAMP,
            reallocated_to_box_number INTEGER,
            source_event_id TEXT NOT NULL REFERENCES scan_events(id),
            CHECK (quantity > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_put_aside_job_status ON put_aside_items(job_id, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the check_sessions table
///
/// The partial unique index enforces at most one active session per
/// box at the storage layer; the engine surfaces the violation as a
/// typed conflict.
pub async fn create_check_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS check_sessions (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES jobs(guid) ON DELETE CASCADE,
            box_number INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'completed')),
            started_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            completed_at TIMESTAMP,
            total_items_expected INTEGER NOT NULL DEFAULT 0,
            total_items_scanned INTEGER NOT NULL DEFAULT 0,
            discrepancies_found INTEGER NOT NULL DEFAULT 0,
            corrections_applied INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_check_sessions_active
        ON check_sessions(job_id, box_number) WHERE status = 'active'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_check_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS check_progress (
            session_id TEXT NOT NULL REFERENCES check_sessions(id) ON DELETE CASCADE,
            bar_code TEXT NOT NULL,
            product_name TEXT NOT NULL,
            expected_qty INTEGER NOT NULL,
            original_scanned_qty INTEGER NOT NULL,
            check_scanned_qty INTEGER NOT NULL DEFAULT 0,
            extra_items INTEGER NOT NULL DEFAULT 0,
            has_discrepancy INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (session_id, bar_code),
            CHECK (expected_qty >= 0),
            CHECK (check_scanned_qty >= 0),
            CHECK (extra_items >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_box_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS box_history (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES jobs(guid) ON DELETE CASCADE,
            box_number INTEGER NOT NULL,
            action TEXT NOT NULL CHECK (action IN ('emptied', 'transferred')),
            performed_by TEXT NOT NULL,
            target_group TEXT,
            reason TEXT,
            items_processed INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_box_history_box ON box_history(job_id, box_number)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_transfer_groups_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transfer_groups (
            job_id TEXT NOT NULL REFERENCES jobs(guid) ON DELETE CASCADE,
            name TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (job_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all engine settings exist with default values and resets
/// NULL values back to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Write contention handling
    ensure_setting(pool, "db_busy_timeout_ms", "5000").await?;
    ensure_setting(pool, "write_retry_attempts", "5").await?;
    ensure_setting(pool, "write_retry_backoff_ms", "25").await?;

    // Event feed
    ensure_setting(pool, "event_bus_capacity", "1000").await?;
    ensure_setting(pool, "sse_heartbeat_seconds", "15").await?;

    // Read models
    ensure_setting(pool, "ledger_page_size", "100").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races:
        // multiple connections may pass the exists check simultaneously
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read an integer setting, falling back to the given default
pub async fn get_setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<i64> =
        sqlx::query_scalar("SELECT CAST(value AS INTEGER) FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_creates_schema_and_settings() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("boxline.db")).await.unwrap();

        // Schema is queryable
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM box_requirements")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        // Defaults present
        let attempts = get_setting_i64(&pool, "write_retry_attempts", 0).await.unwrap();
        assert_eq!(attempts, 5);
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("boxline.db");
        let pool = init_database(&db_path).await.unwrap();
        drop(pool);

        // Second init over the same file must not fail or duplicate
        let pool = init_database(&db_path).await.unwrap();
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'write_retry_attempts'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn active_session_unique_index_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("boxline.db")).await.unwrap();

        sqlx::query("INSERT INTO jobs (guid, name) VALUES ('j1', 'Job 1')")
            .execute(&pool)
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO check_sessions (id, job_id, box_number, user_id) VALUES ('s1', 'j1', 1, 'u1')",
        )
        .execute(&pool)
        .await
        .unwrap();

        // Second active session on the same box violates the partial index
        let second = sqlx::query(
            "INSERT INTO check_sessions (id, job_id, box_number, user_id) VALUES ('s2', 'j1', 1, 'u2')",
        )
        .execute(&pool)
        .await;
        assert!(second.is_err());

        // Completing the first frees the slot
        sqlx::query("UPDATE check_sessions SET status = 'completed' WHERE id = 's1'")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO check_sessions (id, job_id, box_number, user_id) VALUES ('s3', 'j1', 1, 'u2')",
        )
        .execute(&pool)
        .await
        .unwrap();
    }
}
