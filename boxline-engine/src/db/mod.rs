//! Database access layer for boxline-engine
//!
//! One module per table concern. Query functions are generic over the
//! executor so the engine can run them inside a transaction or
//! directly against the pool for read models.

pub mod checkcount;
pub mod history;
pub mod jobs;
pub mod ledger;
pub mod put_aside;
pub mod requirements;

use boxline_common::{Error, Result};
use uuid::Uuid;

/// Parse a TEXT guid column into a Uuid
pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("Invalid guid in database: {}", e)))
}
