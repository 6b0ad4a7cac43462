//! Put-Aside Manager: reallocation of items scanned but not yet boxed
//!
//! Reallocation is exactly-once: the pending→reallocated transition is
//! the dedup key, and a retried call with the same target box returns
//! the stored terminal state instead of double-applying the quantity.

use super::Engine;
use crate::db::{ledger, put_aside, requirements};
use boxline_common::db::models::PutAsideItem;
use boxline_common::events::{EngineEvent, PutAsideStatus, ScanSource};
use boxline_common::{Error, Result};
use uuid::Uuid;

struct ReallocateOutcome {
    item: PutAsideItem,
    box_completed: bool,
    /// False on a retried no-op; suppresses duplicate events
    applied: bool,
}

impl Engine {
    /// Move a pending put-aside item into `target_box_number`
    ///
    /// The target box must still have an open requirement for the
    /// item's barcode covering the full quantity; the override
    /// transfer-to-group path is deliberately not part of this strict
    /// reallocation.
    pub async fn reallocate(
        &self,
        item_id: Uuid,
        target_box_number: i64,
        performed_by: &str,
    ) -> Result<PutAsideItem> {
        if target_box_number <= 0 {
            return Err(Error::Validation(
                "target_box_number must be positive".to_string(),
            ));
        }

        let outcome = self
            .with_write_retry(|| self.try_reallocate(item_id, target_box_number, performed_by))
            .await?;

        // A retried no-op returns the terminal state without
        // re-publishing events
        if outcome.applied {
            self.events().emit(EngineEvent::PutAsideReallocated {
                job_id: outcome.item.job_id,
                item_id,
                target_box_number,
                quantity: outcome.item.quantity,
                performed_by: performed_by.to_string(),
                timestamp: chrono::Utc::now(),
            });
            if outcome.box_completed {
                self.events().emit(EngineEvent::BoxCompleted {
                    job_id: outcome.item.job_id,
                    box_number: target_box_number,
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        Ok(outcome.item)
    }

    async fn try_reallocate(
        &self,
        item_id: Uuid,
        target_box_number: i64,
        performed_by: &str,
    ) -> Result<ReallocateOutcome> {
        let mut tx = self.pool().begin().await?;

        let item = put_aside::get_item(&mut *tx, item_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("put-aside item {}", item_id)))?;

        if item.status == PutAsideStatus::Reallocated {
            // Retry of the identical call is a no-op returning the
            // terminal state; a different target is a real double-use
            if item.reallocated_to_box_number == Some(target_box_number) {
                return Ok(ReallocateOutcome {
                    item,
                    box_completed: false,
                    applied: false,
                });
            }
            return Err(Error::AlreadyReallocated { item_id });
        }

        // The target must actually expect this product, with enough
        // open quantity for the whole item
        requirements::get_row(&mut *tx, item.job_id, target_box_number, &item.bar_code)
            .await?
            .ok_or_else(|| Error::NoMatchingRequirement {
                box_number: target_box_number,
                bar_code: item.bar_code.clone(),
            })?;

        let applied = requirements::add_scanned(
            &mut *tx,
            item.job_id,
            target_box_number,
            &item.bar_code,
            item.quantity,
        )
        .await?;
        if !applied {
            return Err(Error::NoMatchingRequirement {
                box_number: target_box_number,
                bar_code: item.bar_code.clone(),
            });
        }

        if !put_aside::mark_reallocated(&mut *tx, item_id, target_box_number, performed_by).await? {
            // Status changed under us; drop the transaction unapplied
            return Err(Error::AlreadyReallocated { item_id });
        }

        ledger::append_event(
            &mut *tx,
            item.job_id,
            Some(target_box_number),
            &item.bar_code,
            performed_by,
            item.quantity,
            ScanSource::Correction,
        )
        .await?;

        let is_complete =
            requirements::box_is_complete(&mut *tx, item.job_id, target_box_number).await?;

        let updated = put_aside::get_item(&mut *tx, item_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("put-aside item {} vanished", item_id)))?;

        tx.commit().await?;

        // The target had open quantity before, so complete-after is
        // the completion edge
        Ok(ReallocateOutcome {
            item: updated,
            box_completed: is_complete,
            applied: true,
        })
    }

    /// Put-aside read model for a job
    pub async fn list_put_aside(&self, job_id: Uuid) -> Result<Vec<PutAsideItem>> {
        crate::db::jobs::require_job(self.pool(), job_id).await?;
        put_aside::list_items(self.pool(), job_id).await
    }
}
