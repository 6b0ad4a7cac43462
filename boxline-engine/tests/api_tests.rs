//! Integration tests for the HTTP API
//!
//! Exercises routing, JSON shapes, and the error status mapping with
//! in-process requests against a real temporary database.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use boxline_common::db::init_database;
use boxline_common::events::EventBus;
use boxline_engine::{build_router, AppState, Engine};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

async fn setup_app() -> (Router, TempDir) {
    let dir = TempDir::new().expect("Should create temp dir");
    let pool = init_database(&dir.path().join("boxline.db"))
        .await
        .expect("Should initialize database");
    let engine = Engine::new(pool, EventBus::new(64))
        .await
        .expect("Should create engine");
    (build_router(AppState::new(engine)), dir)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Import a small job and return its id
async fn import_job(app: &Router) -> String {
    let body = json!({
        "name": "wave 1",
        "lines": [
            { "box_number": 1, "bar_code": "A", "product_name": "widget",
              "customer_name": "alice", "required_qty": 2 },
            { "box_number": 2, "bar_code": "A", "product_name": "widget",
              "customer_name": "bob", "required_qty": 1 },
            { "box_number": 2, "bar_code": "B", "product_name": "gadget",
              "customer_name": "bob", "required_qty": 1 }
        ]
    });
    let response = app.clone().oneshot(post("/api/jobs", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job = extract_json(response.into_body()).await;
    job["guid"].as_str().expect("Job has a guid").to_string()
}

#[tokio::test]
async fn health_endpoint_works() {
    let (app, _dir) = setup_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "boxline-engine");
}

#[tokio::test]
async fn import_rejects_inconsistent_batches() {
    let (app, _dir) = setup_app().await;

    // Box 1 assigned to two customers
    let body = json!({
        "name": "bad wave",
        "lines": [
            { "box_number": 1, "bar_code": "A", "product_name": "widget",
              "customer_name": "alice", "required_qty": 1 },
            { "box_number": 1, "bar_code": "B", "product_name": "gadget",
              "customer_name": "bob", "required_qty": 1 }
        ]
    });
    let response = app.oneshot(post("/api/jobs", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let err = extract_json(response.into_body()).await;
    assert_eq!(err["kind"], "validation");
}

#[tokio::test]
async fn scan_then_snapshot_round_trip() {
    let (app, _dir) = setup_app().await;
    let job_id = import_job(&app).await;

    let scan = json!({ "job_id": &job_id, "bar_code": "A", "worker_id": "w1" });
    let response = app.clone().oneshot(post("/api/scan", scan)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = extract_json(response.into_body()).await;
    assert_eq!(result["put_aside"], false);
    assert_eq!(result["box_number"], 1);
    assert_eq!(result["scanned_qty"], 1);

    let response = app
        .oneshot(get(&format!("/api/jobs/{}/snapshot", job_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let snapshot = extract_json(response.into_body()).await;
    let boxes = snapshot["boxes"].as_array().unwrap();
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0]["box_number"], 1);
    assert_eq!(boxes[0]["scanned_total"], 1);
    assert_eq!(boxes[0]["is_complete"], false);
}

#[tokio::test]
async fn unknown_job_maps_to_404() {
    let (app, _dir) = setup_app().await;

    let response = app
        .oneshot(get("/api/jobs/00000000-0000-0000-0000-000000000000/snapshot"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let err = extract_json(response.into_body()).await;
    assert_eq!(err["kind"], "not_found");
}

#[tokio::test]
async fn paused_job_maps_to_422() {
    let (app, _dir) = setup_app().await;
    let job_id = import_job(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/jobs/{}/active", job_id),
            json!({ "active": false }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let scan = json!({ "job_id": &job_id, "bar_code": "A", "worker_id": "w1" });
    let response = app.oneshot(post("/api/scan", scan)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let err = extract_json(response.into_body()).await;
    assert_eq!(err["kind"], "scanning_paused");
}

#[tokio::test]
async fn duplicate_check_session_maps_to_409() {
    let (app, _dir) = setup_app().await;
    let job_id = import_job(&app).await;

    let body = json!({ "job_id": &job_id, "box_number": 1, "user_id": "v" });
    let response = app
        .clone()
        .oneshot(post("/api/check-sessions", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(post("/api/check-sessions", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let err = extract_json(response.into_body()).await;
    assert_eq!(err["kind"], "session_already_active");
}

#[tokio::test]
async fn check_session_scan_and_complete_over_http() {
    let (app, _dir) = setup_app().await;
    let job_id = import_job(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            "/api/check-sessions",
            json!({ "job_id": &job_id, "box_number": 2, "user_id": "v" }),
        ))
        .await
        .unwrap();
    let session = extract_json(response.into_body()).await;
    let session_id = session["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/check-sessions/{}/scan", session_id),
            json!({ "bar_code": "A" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let progress = extract_json(response.into_body()).await;
    assert_eq!(progress["check_scanned_qty"], 1);

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/check-sessions/{}/complete", session_id),
            json!({ "apply_corrections": false }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let done = extract_json(response.into_body()).await;
    assert_eq!(done["status"], "completed");

    // Session detail remains readable after completion
    let response = app
        .oneshot(get(&format!("/api/check-sessions/{}", session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = extract_json(response.into_body()).await;
    assert_eq!(detail["status"], "completed");
    assert!(detail["progress"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
async fn put_aside_and_reallocate_over_http() {
    let (app, _dir) = setup_app().await;
    let job_id = import_job(&app).await;

    // Fill A everywhere (2 + 1), then one more goes to put-aside
    for _ in 0..4 {
        let scan = json!({ "job_id": &job_id, "bar_code": "A", "worker_id": "w1" });
        let response = app.clone().oneshot(post("/api/scan", scan)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get(&format!("/api/jobs/{}/put-aside", job_id)))
        .await
        .unwrap();
    let items = extract_json(response.into_body()).await;
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    let item_id = items[0]["id"].as_str().unwrap().to_string();

    // Free box 1, then reallocate into it
    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/jobs/{}/boxes/1/empty", job_id),
            json!({ "performed_by": "super" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/put-aside/{}/reallocate", item_id),
            json!({ "target_box_number": 1, "performed_by": "super" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let item = extract_json(response.into_body()).await;
    assert_eq!(item["status"], "reallocated");
    assert_eq!(item["reallocated_to_box_number"], 1);

    // The ledger shows the original scans, the compensations, and the
    // reallocation correction
    let response = app
        .oneshot(get(&format!("/api/jobs/{}/ledger?limit=50", job_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let events = extract_json(response.into_body()).await;
    assert!(events.as_array().unwrap().len() >= 7);
}

#[tokio::test]
async fn transfer_box_over_http() {
    let (app, _dir) = setup_app().await;
    let job_id = import_job(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/jobs/{}/boxes/2/transfer", job_id),
            json!({ "target_group": "cart-7", "performed_by": "super" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entry = extract_json(response.into_body()).await;
    assert_eq!(entry["action"], "transferred");
    assert_eq!(entry["target_group"], "cart-7");

    let response = app
        .oneshot(get(&format!("/api/jobs/{}/boxes/2/history", job_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = extract_json(response.into_body()).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}
