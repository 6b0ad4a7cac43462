//! boxline-engine library - Box Fulfillment & Verification Engine
//!
//! Turns concurrent barcode scans into per-box fulfillment state:
//! deterministic box assignment, put-aside routing for unplaceable
//! items, box empty/transfer lifecycle, isolated CheckCount
//! verification sessions, an append-only scan ledger, and an SSE
//! change feed for supervisor dashboards.

use axum::Router;

pub mod api;
pub mod db;
pub mod engine;

pub use engine::Engine;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

/// Build application router
///
/// CORS is wide open: scanners and dashboards run on other hosts on
/// the warehouse network.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/api/scan", post(api::scan::record_scan))
        .route("/api/jobs", post(api::jobs::import_job))
        .route("/api/jobs/:job_id/active", post(api::jobs::set_job_active))
        .route("/api/jobs/:job_id/snapshot", get(api::readmodel::job_snapshot))
        .route("/api/jobs/:job_id/ledger", get(api::readmodel::job_ledger))
        .route("/api/jobs/:job_id/put-aside", get(api::put_aside::list_put_aside))
        .route(
            "/api/put-aside/:item_id/reallocate",
            post(api::put_aside::reallocate),
        )
        .route(
            "/api/jobs/:job_id/boxes/:box_number/empty",
            post(api::lifecycle::empty_box),
        )
        .route(
            "/api/jobs/:job_id/boxes/:box_number/transfer",
            post(api::lifecycle::transfer_box),
        )
        .route(
            "/api/jobs/:job_id/boxes/:box_number/history",
            get(api::lifecycle::box_history),
        )
        .route("/api/check-sessions", post(api::checkcount::create_session))
        .route(
            "/api/check-sessions/:session_id",
            get(api::checkcount::get_session),
        )
        .route(
            "/api/check-sessions/:session_id/scan",
            post(api::checkcount::check_scan),
        )
        .route(
            "/api/check-sessions/:session_id/complete",
            post(api::checkcount::complete_session),
        )
        .route("/api/events", get(api::sse::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
