//! Supporting enums shared by events, db rows, and API payloads
//!
//! All of these are stored as TEXT in SQLite; `as_str`/`from_str`
//! convert at the query boundary.

use serde::{Deserialize, Serialize};

/// Origin of a scan ledger entry
///
/// CheckCount probe scans are session-local and never appear in the
/// ledger; only committed corrections do (as `Checkcount`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    Scan,
    Correction,
    Checkcount,
}

impl ScanSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanSource::Scan => "scan",
            ScanSource::Correction => "correction",
            ScanSource::Checkcount => "checkcount",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scan" => Some(ScanSource::Scan),
            "correction" => Some(ScanSource::Correction),
            "checkcount" => Some(ScanSource::Checkcount),
            _ => None,
        }
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    Archived,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "active" => Some(JobStatus::Active),
            "completed" => Some(JobStatus::Completed),
            "archived" => Some(JobStatus::Archived),
            _ => None,
        }
    }
}

/// Put-aside item status (reallocation is exactly-once)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PutAsideStatus {
    Pending,
    Reallocated,
}

impl PutAsideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PutAsideStatus::Pending => "pending",
            PutAsideStatus::Reallocated => "reallocated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PutAsideStatus::Pending),
            "reallocated" => Some(PutAsideStatus::Reallocated),
            _ => None,
        }
    }
}

/// CheckCount session status; `Completed` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }
}

/// Audited terminal box operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxAction {
    Emptied,
    Transferred,
}

impl BoxAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoxAction::Emptied => "emptied",
            BoxAction::Transferred => "transferred",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "emptied" => Some(BoxAction::Emptied),
            "transferred" => Some(BoxAction::Transferred),
            _ => None,
        }
    }
}
