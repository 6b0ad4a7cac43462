//! SSE change feed endpoint

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use uuid::Uuid;

use crate::AppState;
use boxline_common::db::get_setting_i64;
use boxline_common::sse::event_feed;

/// Query parameters for the event stream
#[derive(Debug, Deserialize)]
pub struct EventStreamQuery {
    /// Restrict the feed to one job; omit for all jobs
    pub job_id: Option<Uuid>,
}

/// GET /api/events
///
/// Server-Sent Events stream of engine state changes. Clients get a
/// ConnectionStatus frame on connect and heartbeats while idle.
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventStreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let heartbeat = get_setting_i64(state.engine.pool(), "sse_heartbeat_seconds", 15)
        .await
        .unwrap_or(15)
        .clamp(1, 300) as u64;

    event_feed(
        state.engine.events(),
        query.job_id,
        Duration::from_secs(heartbeat),
    )
}
