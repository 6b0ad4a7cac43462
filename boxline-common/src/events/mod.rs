//! Event types for the Boxline change feed
//!
//! Provides the shared event definitions and EventBus used to publish
//! engine state changes to SSE subscribers (supervisor dashboards).

mod types;

pub use types::{BoxAction, JobStatus, PutAsideStatus, ScanSource, SessionStatus};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Engine event types
///
/// Events are broadcast via EventBus and serialized for SSE
/// transmission. Every mutating engine operation publishes exactly one
/// event (plus `BoxCompleted` on the false→true completion edge), so a
/// subscriber sees a consistent change feed without polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// A scan was accepted and counted against a box
    ///
    /// Triggers:
    /// - SSE: update the per-box quantity display
    ScanRecorded {
        job_id: Uuid,
        box_number: i64,
        bar_code: String,
        worker_id: String,
        /// Quantity after this scan
        scanned_qty: i64,
        required_qty: i64,
        /// Whether the box is complete after this scan
        box_complete: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A box transitioned from incomplete to complete
    ///
    /// Triggers:
    /// - SSE: box-highlight animation on dashboards
    BoxCompleted {
        job_id: Uuid,
        box_number: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A scan could not be routed to any box and was put aside
    ScanPutAside {
        job_id: Uuid,
        item_id: Uuid,
        bar_code: String,
        worker_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A put-aside item was reallocated into a box
    PutAsideReallocated {
        job_id: Uuid,
        item_id: Uuid,
        target_box_number: i64,
        quantity: i64,
        performed_by: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A box was emptied for reallocation
    BoxEmptied {
        job_id: Uuid,
        box_number: i64,
        /// Sum of scanned quantities reset by the operation
        items_processed: i64,
        performed_by: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A box was transferred to a named group
    BoxTransferred {
        job_id: Uuid,
        box_number: i64,
        target_group: String,
        performed_by: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A CheckCount verification session was started
    CheckSessionStarted {
        session_id: Uuid,
        job_id: Uuid,
        box_number: i64,
        user_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A CheckCount session completed (with or without corrections)
    CheckSessionCompleted {
        session_id: Uuid,
        job_id: Uuid,
        box_number: i64,
        discrepancies_found: i64,
        corrections_applied: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job scanning was paused or resumed
    JobActiveChanged {
        job_id: Uuid,
        active: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl EngineEvent {
    /// Job the event belongs to, used for per-job SSE filtering
    pub fn job_id(&self) -> Uuid {
        match self {
            EngineEvent::ScanRecorded { job_id, .. }
            | EngineEvent::BoxCompleted { job_id, .. }
            | EngineEvent::ScanPutAside { job_id, .. }
            | EngineEvent::PutAsideReallocated { job_id, .. }
            | EngineEvent::BoxEmptied { job_id, .. }
            | EngineEvent::BoxTransferred { job_id, .. }
            | EngineEvent::CheckSessionStarted { job_id, .. }
            | EngineEvent::CheckSessionCompleted { job_id, .. }
            | EngineEvent::JobActiveChanged { job_id, .. } => *job_id,
        }
    }

    /// SSE event name for this variant
    pub fn event_name(&self) -> &'static str {
        match self {
            EngineEvent::ScanRecorded { .. } => "ScanRecorded",
            EngineEvent::BoxCompleted { .. } => "BoxCompleted",
            EngineEvent::ScanPutAside { .. } => "ScanPutAside",
            EngineEvent::PutAsideReallocated { .. } => "PutAsideReallocated",
            EngineEvent::BoxEmptied { .. } => "BoxEmptied",
            EngineEvent::BoxTransferred { .. } => "BoxTransferred",
            EngineEvent::CheckSessionStarted { .. } => "CheckSessionStarted",
            EngineEvent::CheckSessionCompleted { .. } => "CheckSessionCompleted",
            EngineEvent::JobActiveChanged { .. } => "JobActiveChanged",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for engine events
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the subscriber count, or 0 when nobody is listening
    /// (not an error: dashboards may simply not be connected).
    pub fn emit(&self, event: EngineEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Channel capacity this bus was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
