//! Common error types for Boxline

use thiserror::Error;
use uuid::Uuid;

/// Common result type for Boxline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by the engine and its API layer
///
/// The domain variants carry enough context (job, box, barcode, item)
/// for the API layer to render a precise message without re-querying.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Concurrent modification conflict that persisted past retries
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Job is inactive or paused; the scan was not applied
    #[error("Scanning is paused for job {job_id}")]
    ScanningPaused { job_id: Uuid },

    /// A CheckCount session is already active for this box
    #[error("A check session is already active for box {box_number} in job {job_id}")]
    SessionAlreadyActive { job_id: Uuid, box_number: i64 },

    /// CheckCount session exists but is no longer active
    #[error("Check session {session_id} is not active")]
    SessionNotActive { session_id: Uuid },

    /// Put-aside item was already reallocated to a different box
    #[error("Put-aside item {item_id} was already reallocated")]
    AlreadyReallocated { item_id: Uuid },

    /// Target box has no requirement row that matches the barcode
    #[error("Box {box_number} has no open requirement for barcode {bar_code}")]
    NoMatchingRequirement { box_number: i64, bar_code: String },

    /// Box has no requirement rows; nothing to transfer
    #[error("Box {box_number} has no requirements; nothing to transfer")]
    EmptyBox { box_number: i64 },

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable kind, included in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::Config(_) => "config",
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation",
            Error::Conflict(_) => "conflict",
            Error::ScanningPaused { .. } => "scanning_paused",
            Error::SessionAlreadyActive { .. } => "session_already_active",
            Error::SessionNotActive { .. } => "session_not_active",
            Error::AlreadyReallocated { .. } => "already_reallocated",
            Error::NoMatchingRequirement { .. } => "no_matching_requirement",
            Error::EmptyBox { .. } => "empty_box",
            Error::Internal(_) => "internal",
        }
    }
}
