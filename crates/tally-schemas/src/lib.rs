//! tally-schemas
//!
//! Shared data model for punch ingestion and session reconciliation.
//! Plain data only: no IO, no policy. Every other crate in the workspace
//! speaks these types.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod time_of_day;

// ---------------------------------------------------------------------------
// Punch classification
// ---------------------------------------------------------------------------

/// What the device says a punch means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PunchKind {
    CheckIn,
    CheckOut,
    /// No label reported (bulk downloads, or a webhook with only a face block).
    Unknown,
}

impl PunchKind {
    /// Map a device label (`"Check In"` / `"Check Out"`) to a kind.
    /// Anything else, including an absent label, is `Unknown`.
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some("Check In") => PunchKind::CheckIn,
            Some("Check Out") => PunchKind::CheckOut,
            _ => PunchKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PunchKind::CheckIn => "CHECK_IN",
            PunchKind::CheckOut => "CHECK_OUT",
            PunchKind::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CHECK_IN" => Some(PunchKind::CheckIn),
            "CHECK_OUT" => Some(PunchKind::CheckOut),
            "UNKNOWN" => Some(PunchKind::Unknown),
            _ => None,
        }
    }
}

/// How the device identified the employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureMethod {
    Face,
    Fingerprint,
    Unknown,
}

impl CaptureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMethod::Face => "FACE",
            CaptureMethod::Fingerprint => "FINGERPRINT",
            CaptureMethod::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FACE" => Some(CaptureMethod::Face),
            "FINGERPRINT" => Some(CaptureMethod::Fingerprint),
            "UNKNOWN" => Some(CaptureMethod::Unknown),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Device-side punch (before directory resolution)
// ---------------------------------------------------------------------------

/// A punch as the device reported it, already normalized to UTC.
///
/// The employee is still identified only by the device-local biometric code;
/// ingestion resolves it against the directory to build a [`PunchEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePunch {
    /// Address the device reported for itself (webhook only).
    pub device_address: Option<String>,
    pub employee_code: String,
    /// Display name carried by the device, used when provisioning.
    pub employee_name: Option<String>,
    pub at_utc: DateTime<Utc>,
    pub kind: PunchKind,
    pub method: CaptureMethod,
}

/// A punch attributed to a known employee. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunchEvent {
    pub employee_id: Uuid,
    pub device_id: Option<Uuid>,
    pub employee_code: String,
    pub at_utc: DateTime<Utc>,
    pub kind: PunchKind,
    pub method: CaptureMethod,
}

impl PunchEvent {
    pub fn from_device(punch: &DevicePunch, employee_id: Uuid, device_id: Option<Uuid>) -> Self {
        Self {
            employee_id,
            device_id,
            employee_code: punch.employee_code.clone(),
            at_utc: punch.at_utc,
            kind: punch.kind,
            method: punch.method,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// Append-only ledger entry, one per accepted punch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttendanceRecord {
    pub record_id: Uuid,
    pub device_id: Option<Uuid>,
    pub employee_id: Uuid,
    pub employee_code: String,
    pub kind: PunchKind,
    pub method: CaptureMethod,
    pub punched_at_utc: DateTime<Utc>,
}

impl RawAttendanceRecord {
    pub fn from_event(ev: &PunchEvent) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            device_id: ev.device_id,
            employee_id: ev.employee_id,
            employee_code: ev.employee_code.clone(),
            kind: ev.kind,
            method: ev.method,
            punched_at_utc: ev.at_utc,
        }
    }
}

/// One check-in/check-out pair.
///
/// `check_out_utc == None` means the session is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub session_id: Uuid,
    pub employee_id: Uuid,
    pub check_in_utc: DateTime<Utc>,
    pub check_out_utc: Option<DateTime<Utc>>,
    /// Check-in was synthesized, not observed.
    pub check_in_inferred: bool,
    /// Check-out was set speculatively when a newer session had to open.
    pub check_out_inferred: bool,
}

impl AttendanceSession {
    pub fn open(employee_id: Uuid, check_in_utc: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            employee_id,
            check_in_utc,
            check_out_utc: None,
            check_in_inferred: false,
            check_out_inferred: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.check_out_utc.is_none()
    }
}

// ---------------------------------------------------------------------------
// Directory records (read-only to the core)
// ---------------------------------------------------------------------------

/// One weekly working interval. `end < start` marks an overnight interval
/// that finishes on the following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkInterval {
    pub weekday: Weekday,
    #[serde(with = "time_of_day")]
    pub start: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end: NaiveTime,
}

impl WorkInterval {
    pub fn new(weekday: Weekday, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            weekday,
            start,
            end,
        }
    }

    pub fn is_overnight(&self) -> bool {
        self.end < self.start
    }
}

/// An employee's weekly work calendar.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmployeeCalendar {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub intervals: Vec<WorkInterval>,
}

impl EmployeeCalendar {
    pub fn new(name: impl Into<String>, intervals: Vec<WorkInterval>) -> Self {
        Self {
            name: name.into(),
            intervals,
        }
    }

    /// Intervals that start on `weekday`, in calendar order.
    pub fn intervals_on(&self, weekday: Weekday) -> impl Iterator<Item = &WorkInterval> {
        self.intervals.iter().filter(move |i| i.weekday == weekday)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: Uuid,
    pub name: String,
    /// Code the biometric device knows this employee by.
    pub biometric_code: String,
    /// Device the employee was enrolled on, if any.
    pub device_id: Option<Uuid>,
    /// IANA zone name. `None` falls back to the configured default zone.
    pub timezone: Option<String>,
}

/// Network identity of a biometric device.
///
/// The password itself never lives here: `password_env` names the
/// environment variable that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: Uuid,
    pub name: String,
    /// Address used to reach the device (and matched against webhooks when
    /// no device is flagged public).
    pub address: String,
    /// LAN address the device reports for itself when it sits behind NAT.
    pub local_address: Option<String>,
    pub port: u16,
    pub username: String,
    pub password_env: Option<String>,
    /// Device is reached through a public address; inbound events are
    /// matched on `local_address` instead of `address`.
    pub is_public: bool,
}
