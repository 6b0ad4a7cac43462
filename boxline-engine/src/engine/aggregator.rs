//! Box Aggregator: converts scan events into per-box quantities
//!
//! The increment-and-recompute for one (box, barcode) key is a single
//! atomic unit; concurrent scans against the same key cannot lose
//! updates because the increment is guarded and the whole transaction
//! retries on snapshot conflicts.

use super::Engine;
use crate::db::{jobs, ledger, put_aside, requirements};
use boxline_common::events::{EngineEvent, JobStatus, ScanSource};
use boxline_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Outcome of one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub job_id: Uuid,
    pub bar_code: String,
    /// True when the scan was routed to put-aside instead of a box
    pub put_aside: bool,
    /// Put-aside item id, when `put_aside`
    pub put_aside_item_id: Option<Uuid>,
    /// Box the scan was counted against, when not put aside
    pub box_number: Option<i64>,
    pub scanned_qty: Option<i64>,
    pub required_qty: Option<i64>,
    /// Whether the chosen box is complete after this scan
    pub is_complete: bool,
    /// True exactly on the box's incomplete→complete transition;
    /// dashboards use this to trigger box-highlight events
    pub box_completed: bool,
}

impl Engine {
    /// Record one scanned unit of `bar_code` against the job
    ///
    /// Deterministic assignment: the lowest box number that still
    /// needs the item wins, unless the worker's allocation hint
    /// (`preferred_box`) still needs it. When no box needs the item
    /// (fulfilled everywhere or unknown barcode) the unit is put
    /// aside; that is a success with a different destination, not a
    /// failure.
    pub async fn record_scan(
        &self,
        job_id: Uuid,
        bar_code: &str,
        worker_id: &str,
        preferred_box: Option<i64>,
    ) -> Result<ScanResult> {
        if bar_code.trim().is_empty() {
            return Err(Error::Validation("bar_code must not be empty".to_string()));
        }

        let result = self
            .with_write_retry(|| self.try_record_scan(job_id, bar_code, worker_id, preferred_box))
            .await?;

        // Publish outside the transaction so subscribers only ever see
        // committed state
        if result.put_aside {
            self.events().emit(EngineEvent::ScanPutAside {
                job_id,
                item_id: result.put_aside_item_id.unwrap_or_default(),
                bar_code: bar_code.to_string(),
                worker_id: worker_id.to_string(),
                timestamp: chrono::Utc::now(),
            });
        } else {
            self.events().emit(EngineEvent::ScanRecorded {
                job_id,
                box_number: result.box_number.unwrap_or_default(),
                bar_code: bar_code.to_string(),
                worker_id: worker_id.to_string(),
                scanned_qty: result.scanned_qty.unwrap_or_default(),
                required_qty: result.required_qty.unwrap_or_default(),
                box_complete: result.is_complete,
                timestamp: chrono::Utc::now(),
            });
            if result.box_completed {
                self.events().emit(EngineEvent::BoxCompleted {
                    job_id,
                    box_number: result.box_number.unwrap_or_default(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        Ok(result)
    }

    async fn try_record_scan(
        &self,
        job_id: Uuid,
        bar_code: &str,
        worker_id: &str,
        preferred_box: Option<i64>,
    ) -> Result<ScanResult> {
        let mut tx = self.pool().begin().await?;

        let job = jobs::require_job(&mut *tx, job_id).await?;
        if !job.active || job.status != JobStatus::Active {
            // No event is recorded; the worker must see "not applied",
            // distinct from the put-aside success path
            return Err(Error::ScanningPaused { job_id });
        }

        // Candidate selection + guarded increment. The re-select loop
        // only matters if the guard misses within our own snapshot,
        // which the transaction makes impossible in practice; it is
        // bounded to keep the invariant obvious.
        for _ in 0..3 {
            let candidate =
                requirements::find_candidate(&mut *tx, job_id, bar_code, preferred_box).await?;

            let Some(req) = candidate else {
                return self.put_aside_in_tx(tx, job_id, bar_code, worker_id, preferred_box).await;
            };

            if !requirements::increment_scanned(&mut *tx, job_id, req.box_number, bar_code).await? {
                debug!(
                    "Guarded increment missed for box {} barcode {}, reselecting",
                    req.box_number, bar_code
                );
                continue;
            }

            ledger::append_event(
                &mut *tx,
                job_id,
                Some(req.box_number),
                bar_code,
                worker_id,
                1,
                ScanSource::Scan,
            )
            .await?;

            let is_complete =
                requirements::box_is_complete(&mut *tx, job_id, req.box_number).await?;
            tx.commit().await?;

            // The chosen row was strictly short before the increment,
            // so the box was incomplete before: complete-after is
            // exactly the false→true edge
            return Ok(ScanResult {
                job_id,
                bar_code: bar_code.to_string(),
                put_aside: false,
                put_aside_item_id: None,
                box_number: Some(req.box_number),
                scanned_qty: Some(req.scanned_qty + 1),
                required_qty: Some(req.required_qty),
                is_complete,
                box_completed: is_complete,
            });
        }

        Err(Error::Conflict(format!(
            "could not place barcode {} in job {}",
            bar_code, job_id
        )))
    }

    /// Put-aside leg of record_scan, consuming the open transaction
    async fn put_aside_in_tx(
        &self,
        mut tx: sqlx::Transaction<'_, sqlx::Sqlite>,
        job_id: Uuid,
        bar_code: &str,
        worker_id: &str,
        origin_box: Option<i64>,
    ) -> Result<ScanResult> {
        // Catalog metadata when the barcode is known to the job
        let meta = requirements::any_row_for_barcode(&mut *tx, job_id, bar_code).await?;
        let (product_name, customer_name) = match &meta {
            Some(row) => (row.product_name.clone(), row.customer_name.clone()),
            None => ("unknown".to_string(), "unknown".to_string()),
        };

        // Ledger entry with no box: counts toward no aggregate until
        // the item is reallocated
        let event_id = ledger::append_event(
            &mut *tx,
            job_id,
            None,
            bar_code,
            worker_id,
            1,
            ScanSource::Scan,
        )
        .await?;

        let item_id = put_aside::insert_item(
            &mut *tx,
            job_id,
            bar_code,
            &product_name,
            &customer_name,
            origin_box,
            1,
            worker_id,
            event_id,
        )
        .await?;

        tx.commit().await?;

        Ok(ScanResult {
            job_id,
            bar_code: bar_code.to_string(),
            put_aside: true,
            put_aside_item_id: Some(item_id),
            box_number: None,
            scanned_qty: None,
            required_qty: None,
            is_complete: false,
            box_completed: false,
        })
    }

    /// Pause or resume scanning for a job
    pub async fn set_job_active(&self, job_id: Uuid, active: bool) -> Result<()> {
        let updated = self
            .with_write_retry(|| async {
                jobs::set_job_active(self.pool(), job_id, active).await
            })
            .await?;

        if updated == 0 {
            return Err(Error::NotFound(format!("job {}", job_id)));
        }

        self.events().emit(EngineEvent::JobActiveChanged {
            job_id,
            active,
            timestamp: chrono::Utc::now(),
        });

        Ok(())
    }
}
