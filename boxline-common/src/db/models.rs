//! Database row models shared across the workspace
//!
//! All quantities are derived from the scan ledger; `scanned_qty` on a
//! requirement row is a materialized view kept in step transactionally
//! with every ledger append.

use crate::events::{BoxAction, JobStatus, PutAsideStatus, ScanSource, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fulfillment job (one import batch of customer orders)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub guid: Uuid,
    pub name: String,
    /// Scanning toggle; an inactive job rejects scans as "paused"
    pub active: bool,
    /// Lifecycle status. Import creates jobs as `active`; the
    /// completed/archived transitions belong to the external archival
    /// process, which writes them directly. The engine only reads this
    /// field and toggles `active`.
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Required and scanned quantity for one (box, barcode) pair
///
/// `required_qty` is fixed at import; `scanned_qty` changes only
/// through scan/correction/empty/checkcount operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxRequirement {
    pub job_id: Uuid,
    pub box_number: i64,
    pub bar_code: String,
    pub product_name: String,
    pub customer_name: String,
    pub required_qty: i64,
    pub scanned_qty: i64,
    /// Set by transferBox; None until the box is transferred
    pub group_label: Option<String>,
}

/// One immutable entry in the append-only scan ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    pub id: Uuid,
    pub job_id: Uuid,
    /// None when the scan was put aside instead of boxed
    pub box_number: Option<i64>,
    pub bar_code: String,
    pub worker_id: String,
    pub quantity_delta: i64,
    pub source: ScanSource,
    pub group_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An item scanned but not yet assignable to a box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutAsideItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub bar_code: String,
    pub product_name: String,
    pub customer_name: String,
    pub original_box_number: Option<i64>,
    pub quantity: i64,
    pub status: PutAsideStatus,
    pub put_aside_by: String,
    pub put_aside_at: DateTime<Utc>,
    pub reallocated_by: Option<String>,
    pub reallocated_at: Option<DateTime<Utc>>,
    pub reallocated_to_box_number: Option<i64>,
    /// Ledger entry recorded when the item was put aside
    pub source_event_id: Uuid,
}

/// An independent verification pass against one box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckCountSession {
    pub id: Uuid,
    pub job_id: Uuid,
    pub box_number: i64,
    pub user_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_items_expected: i64,
    pub total_items_scanned: i64,
    pub discrepancies_found: i64,
    pub corrections_applied: bool,
}

/// Session-local progress for one barcode
///
/// Isolated from the live requirement row: `check_scanned_qty` never
/// touches `scanned_qty` until corrections are explicitly applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckProgress {
    pub session_id: Uuid,
    pub bar_code: String,
    pub product_name: String,
    pub expected_qty: i64,
    /// Live scanned_qty snapshot taken when the session started
    pub original_scanned_qty: i64,
    pub check_scanned_qty: i64,
    pub extra_items: i64,
    pub has_discrepancy: bool,
}

/// Audit trail entry for a terminal box operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxHistoryEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub box_number: i64,
    pub action: BoxAction,
    pub performed_by: String,
    pub target_group: Option<String>,
    pub reason: Option<String>,
    /// Sum of scanned quantities affected by the operation
    pub items_processed: i64,
    pub created_at: DateTime<Utc>,
}
