//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE plumbing for the engine's change feed.

use crate::events::{EngineEvent, EventBus};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Create an SSE stream over the engine change feed
///
/// Subscribes to the EventBus and forwards every event whose job
/// matches `job_filter` (all jobs when `None`). Lagged subscribers are
/// logged and resume with the next available event rather than
/// disconnecting.
pub fn event_feed(
    bus: &EventBus,
    job_filter: Option<Uuid>,
    heartbeat: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = bus.subscribe();
    info!("New SSE client connected (job filter: {:?})", job_filter);

    let stream = async_stream::stream! {
        // Initial connected status so clients can confirm the feed
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(job_id) = job_filter {
                        if event.job_id() != job_id {
                            continue;
                        }
                    }
                    match event_to_sse(&event) {
                        Some(sse_event) => yield Ok(sse_event),
                        None => debug!("Skipping unserializable event"),
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("SSE subscriber lagged, missed {} events", missed);
                    yield Ok(Event::default().event("Lagged").data(missed.to_string()));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("heartbeat"))
}

/// Serialize an engine event into an SSE frame
fn event_to_sse(event: &EngineEvent) -> Option<Event> {
    let data = serde_json::to_string(event).ok()?;
    Some(Event::default().event(event.event_name()).data(data))
}
