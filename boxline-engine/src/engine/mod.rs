//! Box Fulfillment & Verification Engine core
//!
//! All mutating operations run as single-writer SQLite transactions:
//! candidate selection, guarded aggregate update, and ledger append
//! commit or roll back as one unit. WAL serializes writers, so the
//! visible behavior per (job, box, barcode) key is indistinguishable
//! from full serialization; concurrent commits against a stale
//! snapshot surface as busy errors and are retried with bounded
//! attempts.

mod aggregator;
mod checkcount;
mod import;
mod lifecycle;
mod put_aside;

pub use aggregator::ScanResult;
pub use import::{ImportLine, JobImport};

use boxline_common::db::get_setting_i64;
use boxline_common::events::EventBus;
use boxline_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::warn;

/// Bounded retry policy for write contention
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(25),
        }
    }
}

/// The fulfillment engine: owns the database pool and event bus
#[derive(Clone)]
pub struct Engine {
    db: SqlitePool,
    events: EventBus,
    retry: RetryPolicy,
}

impl Engine {
    /// Create an engine with the retry policy stored in settings
    pub async fn new(db: SqlitePool, events: EventBus) -> Result<Self> {
        let attempts = get_setting_i64(&db, "write_retry_attempts", 5).await?.max(1) as u32;
        let backoff_ms = get_setting_i64(&db, "write_retry_backoff_ms", 25).await?.max(1) as u64;

        Ok(Self {
            db,
            events,
            retry: RetryPolicy {
                attempts,
                backoff: Duration::from_millis(backoff_ms),
            },
        })
    }

    /// Create an engine with an explicit retry policy (tests)
    pub fn with_retry(db: SqlitePool, events: EventBus, retry: RetryPolicy) -> Self {
        Self { db, events, retry }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run a transactional write op, retrying on transient lock
    /// contention with bounded attempts before surfacing Conflict
    pub(crate) async fn with_write_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Err(e) if is_busy(&e) => {
                    attempt += 1;
                    if attempt >= self.retry.attempts {
                        return Err(Error::Conflict(format!(
                            "write contention persisted after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    warn!("Write contention (attempt {}): {}", attempt, e);
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                }
                other => return other,
            }
        }
    }
}

/// Whether an error is transient SQLite lock contention
fn is_busy(err: &Error) -> bool {
    match err {
        Error::Database(sqlx::Error::Database(db_err)) => {
            // 5 = SQLITE_BUSY, 6 = SQLITE_LOCKED, 517 = SQLITE_BUSY_SNAPSHOT
            matches!(db_err.code().as_deref(), Some("5") | Some("6") | Some("517"))
        }
        Error::Database(sqlx::Error::PoolTimedOut) => true,
        _ => false,
    }
}
