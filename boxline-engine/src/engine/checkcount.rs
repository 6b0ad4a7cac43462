//! CheckCount Engine: isolated verification sessions
//!
//! State machine: active → completed, nothing else. A session owns its
//! CheckProgress rows exclusively and never writes the live
//! scanned_qty until corrections are explicitly applied at completion.
//! This lets verification run alongside live scanning elsewhere in the
//! job, and gives supervisors an explicit accept/reject decision.

use super::Engine;
use crate::db::{checkcount, jobs, ledger, requirements};
use boxline_common::db::models::{CheckCountSession, CheckProgress};
use boxline_common::events::{EngineEvent, ScanSource, SessionStatus};
use boxline_common::{Error, Result};
use tracing::info;
use uuid::Uuid;

impl Engine {
    /// Start a verification session against a box
    ///
    /// At most one active session per (job, box): a second create
    /// fails with a conflict instead of silently merging.
    pub async fn create_check_session(
        &self,
        job_id: Uuid,
        box_number: i64,
        user_id: &str,
    ) -> Result<CheckCountSession> {
        let session = self
            .with_write_retry(|| self.try_create_check_session(job_id, box_number, user_id))
            .await?;

        self.events().emit(EngineEvent::CheckSessionStarted {
            session_id: session.id,
            job_id,
            box_number,
            user_id: user_id.to_string(),
            timestamp: chrono::Utc::now(),
        });

        Ok(session)
    }

    async fn try_create_check_session(
        &self,
        job_id: Uuid,
        box_number: i64,
        user_id: &str,
    ) -> Result<CheckCountSession> {
        let mut tx = self.pool().begin().await?;

        jobs::require_job(&mut *tx, job_id).await?;
        let rows = requirements::fetch_box_rows(&mut *tx, job_id, box_number).await?;
        if rows.is_empty() {
            return Err(Error::NotFound(format!(
                "box {} in job {}",
                box_number, job_id
            )));
        }

        if checkcount::active_session_for_box(&mut *tx, job_id, box_number)
            .await?
            .is_some()
        {
            return Err(Error::SessionAlreadyActive { job_id, box_number });
        }

        let session_id = Uuid::new_v4();
        let total_expected: i64 = rows.iter().map(|r| r.required_qty).sum();

        // The partial unique index on active sessions backs this up;
        // a racing insert surfaces as a constraint violation
        checkcount::insert_session(&mut *tx, session_id, job_id, box_number, user_id, total_expected)
            .await
            .map_err(|e| match constraint_violation(&e) {
                true => Error::SessionAlreadyActive { job_id, box_number },
                false => e,
            })?;

        // Snapshot: expected from the catalog, original from the live
        // counts, check starts at zero
        for row in &rows {
            checkcount::insert_progress(
                &mut *tx,
                session_id,
                &row.bar_code,
                &row.product_name,
                row.required_qty,
                row.scanned_qty,
            )
            .await?;
        }

        tx.commit().await?;

        checkcount::require_session(self.pool(), session_id).await
    }

    /// Record one probe scan inside an active session
    ///
    /// Touches only the session-local progress; live counts stay
    /// untouched regardless of what is scanned here.
    pub async fn check_scan(&self, session_id: Uuid, bar_code: &str) -> Result<CheckProgress> {
        if bar_code.trim().is_empty() {
            return Err(Error::Validation("bar_code must not be empty".to_string()));
        }

        self.with_write_retry(|| self.try_check_scan(session_id, bar_code))
            .await
    }

    async fn try_check_scan(&self, session_id: Uuid, bar_code: &str) -> Result<CheckProgress> {
        let mut tx = self.pool().begin().await?;

        let session = checkcount::require_session(&mut *tx, session_id).await?;
        if session.status != SessionStatus::Active {
            return Err(Error::SessionNotActive { session_id });
        }

        let progress = match checkcount::get_progress(&mut *tx, session_id, bar_code).await? {
            Some(p) => p,
            None => {
                // Barcode outside the snapshot: the surplus must show
                // up as a discrepancy, not be dropped
                let product_name = requirements::any_row_for_barcode(
                    &mut *tx,
                    session.job_id,
                    bar_code,
                )
                .await?
                .map(|r| r.product_name)
                .unwrap_or_else(|| "unknown".to_string());

                checkcount::insert_progress(&mut *tx, session_id, bar_code, &product_name, 0, 0)
                    .await?;
                checkcount::get_progress(&mut *tx, session_id, bar_code)
                    .await?
                    .ok_or_else(|| Error::Internal("check progress row vanished".to_string()))?
            }
        };

        let check_scanned_qty = progress.check_scanned_qty + 1;
        let extra_items = (check_scanned_qty - progress.expected_qty).max(0);
        let has_discrepancy =
            check_scanned_qty != progress.original_scanned_qty || extra_items > 0;

        checkcount::update_progress(
            &mut *tx,
            session_id,
            bar_code,
            check_scanned_qty,
            extra_items,
            has_discrepancy,
        )
        .await?;

        let (total_scanned, discrepancies) =
            progress_totals(&mut *tx, session_id).await?;
        checkcount::update_session_totals(&mut *tx, session_id, total_scanned, discrepancies)
            .await?;

        let updated = checkcount::get_progress(&mut *tx, session_id, bar_code)
            .await?
            .ok_or_else(|| Error::Internal("check progress row vanished".to_string()))?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Complete a session, optionally committing corrections
    ///
    /// With `apply_corrections`, every discrepant barcode's live count
    /// is overwritten to the session's measured quantity through a
    /// checkcount ledger event, per barcode and independently of other
    /// unresolved barcodes. Without it, live counts are left exactly
    /// as they were. A retry against an already-completed session
    /// returns the stored terminal state without re-applying.
    pub async fn complete_check_session(
        &self,
        session_id: Uuid,
        apply_corrections: bool,
    ) -> Result<CheckCountSession> {
        let outcome = self
            .with_write_retry(|| self.try_complete_check_session(session_id, apply_corrections))
            .await?;

        if outcome.transitioned {
            info!(
                "Check session {} completed ({} discrepancies, corrections {})",
                session_id,
                outcome.session.discrepancies_found,
                if apply_corrections { "applied" } else { "discarded" }
            );
            self.events().emit(EngineEvent::CheckSessionCompleted {
                session_id,
                job_id: outcome.session.job_id,
                box_number: outcome.session.box_number,
                discrepancies_found: outcome.session.discrepancies_found,
                corrections_applied: outcome.session.corrections_applied,
                timestamp: chrono::Utc::now(),
            });
        }

        Ok(outcome.session)
    }

    async fn try_complete_check_session(
        &self,
        session_id: Uuid,
        apply_corrections: bool,
    ) -> Result<CompleteOutcome> {
        let mut tx = self.pool().begin().await?;

        let session = checkcount::require_session(&mut *tx, session_id).await?;
        if session.status == SessionStatus::Completed {
            return Ok(CompleteOutcome {
                session,
                transitioned: false,
            });
        }

        // Final discrepancy evaluation. The per-scan flags only cover
        // barcodes the verifier actually scanned; a row never touched
        // during the session (item entirely absent from the box) still
        // has check 0 against a non-zero original and must count too.
        let mut progress = checkcount::list_progress(&mut *tx, session_id).await?;
        for p in progress.iter_mut() {
            let has_discrepancy =
                p.check_scanned_qty != p.original_scanned_qty || p.extra_items > 0;
            if has_discrepancy != p.has_discrepancy {
                p.has_discrepancy = has_discrepancy;
                checkcount::update_progress(
                    &mut *tx,
                    session_id,
                    &p.bar_code,
                    p.check_scanned_qty,
                    p.extra_items,
                    has_discrepancy,
                )
                .await?;
            }
        }
        let discrepancies = progress.iter().filter(|p| p.has_discrepancy).count() as i64;

        if apply_corrections {
            for p in progress.iter().filter(|p| p.has_discrepancy) {
                // Only barcodes the box actually requires have a live
                // row to correct; snapshot-external surplus stays in
                // the session record
                let Some(live) = requirements::get_row(
                    &mut *tx,
                    session.job_id,
                    session.box_number,
                    &p.bar_code,
                )
                .await?
                else {
                    continue;
                };

                // Delta against the current live value, not the
                // session snapshot, so the ledger keeps summing to the
                // aggregate even if the box moved during the session
                let delta = p.check_scanned_qty - live.scanned_qty;
                if delta != 0 {
                    ledger::append_event(
                        &mut *tx,
                        session.job_id,
                        Some(session.box_number),
                        &p.bar_code,
                        &session.user_id,
                        delta,
                        ScanSource::Checkcount,
                    )
                    .await?;
                }
                requirements::set_scanned(
                    &mut *tx,
                    session.job_id,
                    session.box_number,
                    &p.bar_code,
                    p.check_scanned_qty,
                )
                .await?;
            }
        }

        if !checkcount::mark_completed(&mut *tx, session_id, discrepancies, apply_corrections)
            .await?
        {
            // Lost the transition race; the transaction rolls back and
            // the stored terminal session is returned instead
            drop(tx);
            let stored = checkcount::require_session(self.pool(), session_id).await?;
            return Ok(CompleteOutcome {
                session: stored,
                transitioned: false,
            });
        }

        tx.commit().await?;

        let stored = checkcount::require_session(self.pool(), session_id).await?;
        Ok(CompleteOutcome {
            session: stored,
            transitioned: true,
        })
    }

    /// Session read model (including completed history)
    pub async fn check_session(&self, session_id: Uuid) -> Result<CheckCountSession> {
        checkcount::require_session(self.pool(), session_id).await
    }

    /// Progress rows of a session, ordered by barcode
    pub async fn check_session_progress(&self, session_id: Uuid) -> Result<Vec<CheckProgress>> {
        checkcount::require_session(self.pool(), session_id).await?;
        checkcount::list_progress(self.pool(), session_id).await
    }
}

struct CompleteOutcome {
    session: CheckCountSession,
    /// False when this call observed an already-completed session
    transitioned: bool,
}

/// Running totals across a session's progress rows
async fn progress_totals(
    tx: &mut sqlx::SqliteConnection,
    session_id: Uuid,
) -> Result<(i64, i64)> {
    let totals: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(check_scanned_qty), 0),
               COALESCE(SUM(has_discrepancy), 0)
        FROM check_progress
        WHERE session_id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_one(tx)
    .await?;

    Ok(totals)
}

/// Whether a database error is a uniqueness/constraint violation
fn constraint_violation(err: &Error) -> bool {
    match err {
        Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    }
}
