//! Request and response types for tally-daemon HTTP endpoints.
//!
//! No business logic lives here.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tally_schemas::{AttendanceSession, RawAttendanceRecord};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable tag, e.g. "MALFORMED_PAYLOAD".
    pub error: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Bulk download
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Read APIs
// ---------------------------------------------------------------------------

/// Optional `from`/`to`; defaults to the last seven days.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub check_in_utc: DateTime<Utc>,
    pub check_out_utc: Option<DateTime<Utc>>,
    /// `HH:MM:SS` in the employee's zone.
    pub check_in_local: String,
    pub check_out_local: Option<String>,
    pub check_in_inferred: bool,
    pub check_out_inferred: bool,
}

impl SessionView {
    pub fn from_session(s: &AttendanceSession, tz: Tz) -> Self {
        let local = |at: DateTime<Utc>| at.with_timezone(&tz).format("%H:%M:%S").to_string();
        Self {
            session_id: s.session_id,
            check_in_utc: s.check_in_utc,
            check_out_utc: s.check_out_utc,
            check_in_local: local(s.check_in_utc),
            check_out_local: s.check_out_utc.map(local),
            check_in_inferred: s.check_in_inferred,
            check_out_inferred: s.check_out_inferred,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub employee_id: Uuid,
    pub timezone: String,
    pub sessions: Vec<SessionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunchesResponse {
    pub employee_id: Uuid,
    pub punches: Vec<RawAttendanceRecord>,
}
