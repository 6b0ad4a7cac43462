//! Box Lifecycle Manager: Empty and Transfer
//!
//! Both operations write compensating/tagging entries through the scan
//! ledger contract instead of deleting history, and each produces one
//! audit entry in box_history.

use super::Engine;
use crate::db::{history, jobs, ledger, requirements};
use boxline_common::db::models::BoxHistoryEntry;
use boxline_common::events::{BoxAction, EngineEvent, ScanSource};
use boxline_common::{Error, Result};
use tracing::info;
use uuid::Uuid;

impl Engine {
    /// Reset a box's scanned state for reallocation
    ///
    /// Every non-zero row gets a compensating correction event
    /// (delta = −scanned_qty) so the ledger still sums to the live
    /// aggregate. The transaction gives the reset exclusive access to
    /// the box's rows; an in-flight scan against the same box either
    /// lands before the reset (and is zeroed with the rest) or after
    /// it (against the freshly emptied box).
    pub async fn empty_box(
        &self,
        job_id: Uuid,
        box_number: i64,
        performed_by: &str,
        reason: Option<&str>,
    ) -> Result<BoxHistoryEntry> {
        let entry = self
            .with_write_retry(|| self.try_empty_box(job_id, box_number, performed_by, reason))
            .await?;

        info!(
            "Emptied box {} in job {} ({} items)",
            box_number, job_id, entry.items_processed
        );
        self.events().emit(EngineEvent::BoxEmptied {
            job_id,
            box_number,
            items_processed: entry.items_processed,
            performed_by: performed_by.to_string(),
            timestamp: chrono::Utc::now(),
        });

        Ok(entry)
    }

    async fn try_empty_box(
        &self,
        job_id: Uuid,
        box_number: i64,
        performed_by: &str,
        reason: Option<&str>,
    ) -> Result<BoxHistoryEntry> {
        let mut tx = self.pool().begin().await?;

        jobs::require_job(&mut *tx, job_id).await?;
        let rows = requirements::fetch_box_rows(&mut *tx, job_id, box_number).await?;
        if rows.is_empty() {
            return Err(Error::NotFound(format!(
                "box {} in job {}",
                box_number, job_id
            )));
        }

        let total: i64 = rows.iter().map(|r| r.scanned_qty).sum();
        for row in rows.iter().filter(|r| r.scanned_qty > 0) {
            ledger::append_event(
                &mut *tx,
                job_id,
                Some(box_number),
                &row.bar_code,
                performed_by,
                -row.scanned_qty,
                ScanSource::Correction,
            )
            .await?;
        }

        requirements::zero_box(&mut *tx, job_id, box_number).await?;

        let entry = history::insert_entry(
            &mut *tx,
            job_id,
            box_number,
            BoxAction::Emptied,
            performed_by,
            None,
            reason,
            total,
        )
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    /// Reassign a box's contents to a named group
    ///
    /// Tags the box's requirement rows and their ledger entries with
    /// the group label (creating the group on first use); quantities
    /// are untouched.
    pub async fn transfer_box(
        &self,
        job_id: Uuid,
        box_number: i64,
        target_group: &str,
        performed_by: &str,
        reason: Option<&str>,
    ) -> Result<BoxHistoryEntry> {
        let target_group = target_group.trim();
        if target_group.is_empty() {
            return Err(Error::Validation("target_group must not be empty".to_string()));
        }

        let entry = self
            .with_write_retry(|| {
                self.try_transfer_box(job_id, box_number, target_group, performed_by, reason)
            })
            .await?;

        info!(
            "Transferred box {} in job {} to group '{}'",
            box_number, job_id, target_group
        );
        self.events().emit(EngineEvent::BoxTransferred {
            job_id,
            box_number,
            target_group: target_group.to_string(),
            performed_by: performed_by.to_string(),
            timestamp: chrono::Utc::now(),
        });

        Ok(entry)
    }

    async fn try_transfer_box(
        &self,
        job_id: Uuid,
        box_number: i64,
        target_group: &str,
        performed_by: &str,
        reason: Option<&str>,
    ) -> Result<BoxHistoryEntry> {
        let mut tx = self.pool().begin().await?;

        jobs::require_job(&mut *tx, job_id).await?;
        let rows = requirements::fetch_box_rows(&mut *tx, job_id, box_number).await?;
        if rows.is_empty() {
            return Err(Error::EmptyBox { box_number });
        }

        history::ensure_transfer_group(&mut *tx, job_id, target_group, performed_by).await?;
        requirements::tag_box_group(&mut *tx, job_id, box_number, target_group).await?;
        ledger::tag_box_events(&mut *tx, job_id, box_number, target_group).await?;

        let total: i64 = rows.iter().map(|r| r.scanned_qty).sum();
        let entry = history::insert_entry(
            &mut *tx,
            job_id,
            box_number,
            BoxAction::Transferred,
            performed_by,
            Some(target_group),
            reason,
            total,
        )
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    /// Audit read model for a box
    pub async fn box_history(&self, job_id: Uuid, box_number: i64) -> Result<Vec<BoxHistoryEntry>> {
        jobs::require_job(self.pool(), job_id).await?;
        history::list_box_history(self.pool(), job_id, box_number).await
    }
}
