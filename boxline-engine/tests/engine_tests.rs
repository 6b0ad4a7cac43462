//! Integration tests for the fulfillment engine core
//!
//! Covers scan routing, put-aside, box lifecycle, CheckCount
//! isolation, and ledger conservation against a real SQLite file.

use boxline_common::db::init_database;
use boxline_common::events::{EngineEvent, EventBus, PutAsideStatus, SessionStatus};
use boxline_common::Error;
use boxline_engine::engine::{ImportLine, JobImport};
use boxline_engine::Engine;
use boxline_engine::db::{ledger, requirements};
use tempfile::TempDir;
use uuid::Uuid;

async fn setup_engine() -> (Engine, TempDir) {
    let dir = TempDir::new().expect("Should create temp dir");
    let pool = init_database(&dir.path().join("boxline.db"))
        .await
        .expect("Should initialize database");
    let engine = Engine::new(pool, EventBus::new(64))
        .await
        .expect("Should create engine");
    (engine, dir)
}

fn line(box_number: i64, bar_code: &str, customer: &str, qty: i64) -> ImportLine {
    ImportLine {
        box_number,
        bar_code: bar_code.to_string(),
        product_name: format!("product-{}", bar_code),
        customer_name: customer.to_string(),
        required_qty: qty,
    }
}

/// One job, three boxes: box 1 and 2 both want barcode A, box 3 wants
/// barcode B only.
async fn seed_job(engine: &Engine) -> Uuid {
    let import = JobImport {
        name: "test wave".to_string(),
        lines: vec![
            line(1, "A", "alice", 2),
            line(1, "B", "alice", 1),
            line(2, "A", "bob", 1),
            line(3, "B", "carol", 2),
        ],
    };
    engine.import_job(&import).await.expect("Should import job").guid
}

#[tokio::test]
async fn scan_routes_to_lowest_box_that_needs_the_item() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    // Box 1 needs 2 of A, box 2 needs 1; the first three scans fill
    // box 1 then box 2
    for expected_box in [1, 1, 2] {
        let result = engine
            .record_scan(job_id, "A", "worker-1", None)
            .await
            .expect("Should record scan");
        assert!(!result.put_aside);
        assert_eq!(result.box_number, Some(expected_box));
    }
}

#[tokio::test]
async fn preferred_box_hint_wins_while_it_still_needs_the_item() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    let result = engine
        .record_scan(job_id, "A", "worker-1", Some(2))
        .await
        .expect("Should record scan");
    assert_eq!(result.box_number, Some(2));

    // Box 2 is now full of A; the hint no longer qualifies and the
    // scan falls back to box 1
    let result = engine
        .record_scan(job_id, "A", "worker-1", Some(2))
        .await
        .expect("Should record scan");
    assert_eq!(result.box_number, Some(1));
}

#[tokio::test]
async fn box_completion_fires_exactly_on_the_edge() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;
    let mut rx = engine.events().subscribe();

    // Box 2 needs exactly one A
    let result = engine
        .record_scan(job_id, "A", "worker-1", Some(2))
        .await
        .expect("Should record scan");
    assert!(result.is_complete);
    assert!(result.box_completed);

    let mut saw_completed = false;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::BoxCompleted { box_number, .. } = event {
            assert_eq!(box_number, 2);
            saw_completed = true;
        }
    }
    assert!(saw_completed, "BoxCompleted should have been published");
}

#[tokio::test]
async fn unknown_barcode_is_put_aside_not_rejected() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    let result = engine
        .record_scan(job_id, "MYSTERY", "worker-1", None)
        .await
        .expect("Put-aside is a success outcome");
    assert!(result.put_aside);
    assert!(result.put_aside_item_id.is_some());
    assert_eq!(result.box_number, None);

    let items = engine.list_put_aside(job_id).await.expect("Should list");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].bar_code, "MYSTERY");
    assert_eq!(items[0].status, PutAsideStatus::Pending);
}

#[tokio::test]
async fn fully_satisfied_barcode_is_put_aside() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    // Fill every box that wants A (2 + 1 units)
    for _ in 0..3 {
        let r = engine.record_scan(job_id, "A", "w", None).await.unwrap();
        assert!(!r.put_aside);
    }

    let result = engine.record_scan(job_id, "A", "w", None).await.unwrap();
    assert!(result.put_aside);
}

#[tokio::test]
async fn paused_job_rejects_scans_without_recording() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    engine.set_job_active(job_id, false).await.expect("Should pause");

    let err = engine
        .record_scan(job_id, "A", "worker-1", None)
        .await
        .expect_err("Paused job must reject scans");
    assert!(matches!(err, Error::ScanningPaused { .. }));

    // Nothing landed in the ledger or the aggregates
    let sum = ledger::ledger_sum(engine.pool(), job_id, 1, "A").await.unwrap();
    assert_eq!(sum, 0);

    engine.set_job_active(job_id, true).await.expect("Should resume");
    let result = engine.record_scan(job_id, "A", "worker-1", None).await.unwrap();
    assert!(!result.put_aside);
}

#[tokio::test]
async fn reallocation_is_exactly_once() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    let put = engine.record_scan(job_id, "MYSTERY", "w", None).await.unwrap();
    assert!(put.put_aside);

    // MYSTERY has no requirement anywhere, so use a real one: fill
    // nothing and reallocate a put-aside A instead
    for _ in 0..3 {
        engine.record_scan(job_id, "A", "w", None).await.unwrap();
    }
    let extra = engine.record_scan(job_id, "A", "w", None).await.unwrap();
    assert!(extra.put_aside);
    let item_id = extra.put_aside_item_id.unwrap();

    // Make room in box 1 so the reallocation has a target
    engine.empty_box(job_id, 1, "super", None).await.unwrap();

    let item = engine.reallocate(item_id, 1, "super").await.expect("Should reallocate");
    assert_eq!(item.status, PutAsideStatus::Reallocated);
    assert_eq!(item.reallocated_to_box_number, Some(1));

    // Retry with the same target is a no-op returning the terminal
    // state; quantity is not applied twice
    let before = requirements::get_row(engine.pool(), job_id, 1, "A")
        .await
        .unwrap()
        .unwrap()
        .scanned_qty;
    let again = engine.reallocate(item_id, 1, "super").await.expect("Retry is ok");
    assert_eq!(again.status, PutAsideStatus::Reallocated);
    let after = requirements::get_row(engine.pool(), job_id, 1, "A")
        .await
        .unwrap()
        .unwrap()
        .scanned_qty;
    assert_eq!(before, after);

    // A different target is a real double-use
    let err = engine.reallocate(item_id, 2, "super").await.expect_err("Must conflict");
    assert!(matches!(err, Error::AlreadyReallocated { .. }));
}

#[tokio::test]
async fn reallocation_requires_an_open_matching_requirement() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    let put = engine.record_scan(job_id, "MYSTERY", "w", None).await.unwrap();
    let item_id = put.put_aside_item_id.unwrap();

    // Box 1 never required MYSTERY
    let err = engine.reallocate(item_id, 1, "super").await.expect_err("No match");
    assert!(matches!(err, Error::NoMatchingRequirement { .. }));

    let items = engine.list_put_aside(job_id).await.unwrap();
    assert_eq!(items[0].status, PutAsideStatus::Pending);
}

#[tokio::test]
async fn empty_box_resets_counts_and_conserves_the_ledger() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    engine.record_scan(job_id, "A", "w", Some(1)).await.unwrap();
    engine.record_scan(job_id, "A", "w", Some(1)).await.unwrap();
    engine.record_scan(job_id, "B", "w", Some(1)).await.unwrap();

    let entry = engine.empty_box(job_id, 1, "super", Some("water damage")).await.unwrap();
    assert_eq!(entry.items_processed, 3);

    // Aggregates are zero and the ledger still sums to them
    for bar_code in ["A", "B"] {
        let row = requirements::get_row(engine.pool(), job_id, 1, bar_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.scanned_qty, 0);
        let sum = ledger::ledger_sum(engine.pool(), job_id, 1, bar_code).await.unwrap();
        assert_eq!(sum, 0);
    }

    // Re-scanning after the reset completes the box again
    engine.record_scan(job_id, "A", "w", Some(1)).await.unwrap();
    engine.record_scan(job_id, "A", "w", Some(1)).await.unwrap();
    let last = engine.record_scan(job_id, "B", "w", Some(1)).await.unwrap();
    assert!(last.is_complete);

    let history = engine.box_history(job_id, 1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason.as_deref(), Some("water damage"));
}

#[tokio::test]
async fn transfer_tags_rows_and_ledger_without_touching_quantities() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    engine.record_scan(job_id, "A", "w", Some(1)).await.unwrap();

    engine
        .transfer_box(job_id, 1, "overflow-cart", "super", None)
        .await
        .expect("Should transfer");

    let row = requirements::get_row(engine.pool(), job_id, 1, "A")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.group_label.as_deref(), Some("overflow-cart"));
    assert_eq!(row.scanned_qty, 1);

    let events = ledger::recent_events(engine.pool(), job_id, 10).await.unwrap();
    let boxed: Vec<_> = events.iter().filter(|e| e.box_number == Some(1)).collect();
    assert!(!boxed.is_empty());
    assert!(boxed.iter().all(|e| e.group_label.as_deref() == Some("overflow-cart")));

    // Transferring a box with no requirement rows at all is an error
    let err = engine
        .transfer_box(job_id, 99, "overflow-cart", "super", None)
        .await
        .expect_err("Nothing to transfer");
    assert!(matches!(err, Error::EmptyBox { .. }));
}

#[tokio::test]
async fn check_session_is_isolated_from_live_counts() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    engine.record_scan(job_id, "A", "w", Some(1)).await.unwrap();

    let session = engine
        .create_check_session(job_id, 1, "verifier")
        .await
        .expect("Should start session");
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.total_items_expected, 3);

    // Check scans do not move the live aggregate
    engine.check_scan(session.id, "A").await.unwrap();
    let row = requirements::get_row(engine.pool(), job_id, 1, "A")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.scanned_qty, 1);

    // Live scans elsewhere do not move the session snapshot
    engine.record_scan(job_id, "B", "w", Some(3)).await.unwrap();
    let progress = engine.check_session_progress(session.id).await.unwrap();
    let a = progress.iter().find(|p| p.bar_code == "A").unwrap();
    assert_eq!(a.check_scanned_qty, 1);
    assert_eq!(a.original_scanned_qty, 1);
}

#[tokio::test]
async fn at_most_one_active_session_per_box() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    let session = engine.create_check_session(job_id, 1, "v1").await.unwrap();

    let err = engine
        .create_check_session(job_id, 1, "v2")
        .await
        .expect_err("Second session must conflict");
    assert!(matches!(err, Error::SessionAlreadyActive { .. }));

    // A different box is fine, and completing frees the slot
    engine.create_check_session(job_id, 2, "v2").await.unwrap();
    engine.complete_check_session(session.id, false).await.unwrap();
    engine.create_check_session(job_id, 1, "v3").await.unwrap();
}

#[tokio::test]
async fn completing_without_corrections_leaves_live_counts() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    engine.record_scan(job_id, "A", "w", Some(1)).await.unwrap();
    engine.record_scan(job_id, "A", "w", Some(1)).await.unwrap();

    let session = engine.create_check_session(job_id, 1, "v").await.unwrap();
    // Only one A found during verification: a discrepancy
    engine.check_scan(session.id, "A").await.unwrap();

    let done = engine.complete_check_session(session.id, false).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.discrepancies_found, 1);
    assert!(!done.corrections_applied);

    let row = requirements::get_row(engine.pool(), job_id, 1, "A")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.scanned_qty, 2);
}

#[tokio::test]
async fn applying_corrections_overwrites_live_counts_per_barcode() {
    let (engine, _dir) = setup_engine().await;

    // One box wanting 3 of a single barcode, fully scanned
    let import = JobImport {
        name: "wave".to_string(),
        lines: vec![line(5, "A", "alice", 3)],
    };
    let job_id = engine.import_job(&import).await.unwrap().guid;
    for _ in 0..3 {
        engine.record_scan(job_id, "A", "w", None).await.unwrap();
    }
    assert!(requirements::box_is_complete(engine.pool(), job_id, 5).await.unwrap());

    // Verification only finds 2
    let session = engine.create_check_session(job_id, 5, "v").await.unwrap();
    engine.check_scan(session.id, "A").await.unwrap();
    let p = engine.check_scan(session.id, "A").await.unwrap();
    assert!(p.has_discrepancy);

    let done = engine.complete_check_session(session.id, true).await.unwrap();
    assert!(done.corrections_applied);

    // Live count overwritten to the measured quantity; the box is
    // incomplete again and the ledger agrees with the new count
    let row = requirements::get_row(engine.pool(), job_id, 5, "A")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.scanned_qty, 2);
    assert!(!requirements::box_is_complete(engine.pool(), job_id, 5).await.unwrap());
    let sum = ledger::ledger_sum(engine.pool(), job_id, 5, "A").await.unwrap();
    assert_eq!(sum, 2);

    // Completing again is idempotent: no further correction applied
    let again = engine.complete_check_session(session.id, true).await.unwrap();
    assert_eq!(again.status, SessionStatus::Completed);
    let row = requirements::get_row(engine.pool(), job_id, 5, "A")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.scanned_qty, 2);
}

#[tokio::test]
async fn unscanned_barcode_counts_as_missing_at_completion() {
    let (engine, _dir) = setup_engine().await;

    let import = JobImport {
        name: "wave".to_string(),
        lines: vec![line(5, "A", "alice", 3)],
    };
    let job_id = engine.import_job(&import).await.unwrap().guid;
    for _ in 0..3 {
        engine.record_scan(job_id, "A", "w", None).await.unwrap();
    }

    // The verifier opens the box, finds nothing, and completes the
    // session without a single check scan
    let session = engine.create_check_session(job_id, 5, "v").await.unwrap();
    let done = engine.complete_check_session(session.id, true).await.unwrap();
    assert_eq!(done.discrepancies_found, 1);

    let progress = engine.check_session_progress(session.id).await.unwrap();
    assert!(progress[0].has_discrepancy);

    // The missing item is corrected down to the measured zero and the
    // ledger follows
    let row = requirements::get_row(engine.pool(), job_id, 5, "A")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.scanned_qty, 0);
    let sum = ledger::ledger_sum(engine.pool(), job_id, 5, "A").await.unwrap();
    assert_eq!(sum, 0);
    assert!(!requirements::box_is_complete(engine.pool(), job_id, 5).await.unwrap());
}

#[tokio::test]
async fn overscan_correction_can_exceed_the_required_quantity() {
    let (engine, _dir) = setup_engine().await;

    let import = JobImport {
        name: "wave".to_string(),
        lines: vec![line(1, "A", "alice", 2)],
    };
    let job_id = engine.import_job(&import).await.unwrap().guid;
    engine.record_scan(job_id, "A", "w", None).await.unwrap();
    engine.record_scan(job_id, "A", "w", None).await.unwrap();

    // Verification finds three units of a barcode the box only
    // requires two of
    let session = engine.create_check_session(job_id, 1, "v").await.unwrap();
    engine.check_scan(session.id, "A").await.unwrap();
    engine.check_scan(session.id, "A").await.unwrap();
    let p = engine.check_scan(session.id, "A").await.unwrap();
    assert_eq!(p.extra_items, 1);
    assert!(p.has_discrepancy);

    let done = engine.complete_check_session(session.id, true).await.unwrap();
    assert!(done.corrections_applied);
    assert_eq!(done.discrepancies_found, 1);

    // The live count is overwritten to the measured value even above
    // required_qty, the ledger still sums to it, and the box stays
    // complete (no row is short)
    let row = requirements::get_row(engine.pool(), job_id, 1, "A")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.scanned_qty, 3);
    let sum = ledger::ledger_sum(engine.pool(), job_id, 1, "A").await.unwrap();
    assert_eq!(sum, 3);
    assert!(requirements::box_is_complete(engine.pool(), job_id, 1).await.unwrap());
}

#[tokio::test]
async fn surplus_barcode_in_session_counts_as_discrepancy() {
    let (engine, _dir) = setup_engine().await;
    let job_id = seed_job(&engine).await;

    let session = engine.create_check_session(job_id, 1, "v").await.unwrap();
    let p = engine.check_scan(session.id, "NOT-IN-BOX").await.unwrap();
    assert_eq!(p.expected_qty, 0);
    assert_eq!(p.extra_items, 1);
    assert!(p.has_discrepancy);

    let err = {
        engine.complete_check_session(session.id, true).await.unwrap();
        engine.check_scan(session.id, "A").await.expect_err("Completed session")
    };
    assert!(matches!(err, Error::SessionNotActive { .. }));
}

#[tokio::test]
async fn multi_unit_item_reallocates_its_full_quantity_once() {
    let (engine, _dir) = setup_engine().await;

    // Box 9 needs exactly 4 of barcode C and has none yet
    let import = JobImport {
        name: "wave".to_string(),
        lines: vec![line(9, "C", "dave", 4)],
    };
    let job_id = engine.import_job(&import).await.unwrap().guid;

    // Seed a quantity-4 put-aside item the way the engine records
    // them: a NULL-box ledger event plus the pending item
    let event_id = boxline_engine::db::ledger::append_event(
        engine.pool(),
        job_id,
        None,
        "C",
        "w",
        4,
        boxline_common::events::ScanSource::Scan,
    )
    .await
    .unwrap();
    let item_id = boxline_engine::db::put_aside::insert_item(
        engine.pool(),
        job_id,
        "C",
        "crate of gizmos",
        "dave",
        None,
        4,
        "w",
        event_id,
    )
    .await
    .unwrap();

    let item = engine.reallocate(item_id, 9, "super").await.unwrap();
    assert_eq!(item.status, PutAsideStatus::Reallocated);

    let row = requirements::get_row(engine.pool(), job_id, 9, "C")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.scanned_qty, 4);
    assert!(requirements::box_is_complete(engine.pool(), job_id, 9).await.unwrap());

    // Retry is a no-op returning the same terminal state
    let again = engine.reallocate(item_id, 9, "super").await.unwrap();
    assert_eq!(again.reallocated_to_box_number, Some(9));
    let row = requirements::get_row(engine.pool(), job_id, 9, "C")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.scanned_qty, 4);
}

#[tokio::test]
async fn concurrent_scans_never_lose_updates() {
    let (engine, _dir) = setup_engine().await;

    let import = JobImport {
        name: "wave".to_string(),
        lines: vec![line(1, "A", "alice", 10), line(2, "A", "bob", 10)],
    };
    let job_id = engine.import_job(&import).await.unwrap().guid;

    // 20 concurrent scans, exactly the combined capacity
    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .record_scan(job_id, "A", &format!("worker-{}", i % 4), None)
                .await
        }));
    }

    let mut boxed = 0;
    for handle in handles {
        let result = handle.await.expect("Task should finish").expect("Scan should apply");
        if !result.put_aside {
            boxed += 1;
        }
    }
    assert_eq!(boxed, 20);

    // Aggregates and ledger agree per key, and nothing overflowed
    for box_number in [1, 2] {
        let row = requirements::get_row(engine.pool(), job_id, box_number, "A")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.scanned_qty, 10);
        let sum = ledger::ledger_sum(engine.pool(), job_id, box_number, "A").await.unwrap();
        assert_eq!(sum, 10);
    }
}
