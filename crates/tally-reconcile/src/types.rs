use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tally_calendar::DayPolicy;
use tally_schemas::{AttendanceSession, RawAttendanceRecord};
use uuid::Uuid;

/// Classification strategy, chosen by the ingestion path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconciliationPolicy {
    /// Webhook: the device labels each punch Check In / Check Out.
    LabelDriven,
    /// Bulk pull: punches are unlabeled; calendar membership decides.
    ShiftDriven,
}

impl ReconciliationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationPolicy::LabelDriven => "label_driven",
            ReconciliationPolicy::ShiftDriven => "shift_driven",
        }
    }
}

/// Tunable time-of-day constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileParams {
    pub day: DayPolicy,
    /// Latest next-morning local time a shift-driven check-out may close
    /// the previous day's open session.
    pub late_checkout_cutoff: NaiveTime,
    /// Local time of the synthesized check-in when a check-out arrives
    /// without one.
    pub inferred_check_in: NaiveTime,
}

impl Default for ReconcileParams {
    fn default() -> Self {
        Self {
            day: DayPolicy::default(),
            late_checkout_cutoff: NaiveTime::from_hms_opt(5, 0, 0).unwrap_or(NaiveTime::MIN),
            inferred_check_in: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Per-employee state handed to the reconciler.
///
/// Holds the sessions and raw punches around the punch being reconciled,
/// plus the employee's open session wherever it falls in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmployeeLedger {
    pub employee_id: Uuid,
    pub sessions: Vec<AttendanceSession>,
    pub raw: Vec<RawAttendanceRecord>,
}

impl EmployeeLedger {
    pub fn new(employee_id: Uuid) -> Self {
        Self {
            employee_id,
            sessions: Vec::new(),
            raw: Vec::new(),
        }
    }

    /// Most recent session without a check-out.
    pub fn open_session(&self) -> Option<&AttendanceSession> {
        self.sessions
            .iter()
            .filter(|s| s.is_open())
            .max_by_key(|s| s.check_in_utc)
    }

    /// `true` if any session checked in within `[start, end]`.
    pub fn has_check_in_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.sessions
            .iter()
            .any(|s| start <= s.check_in_utc && s.check_in_utc <= end)
    }

    pub fn open_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_open()).count()
    }

    /// Apply the session writes of `outcome`.
    pub fn apply(&mut self, outcome: &Outcome) {
        if let Outcome::Applied(changes) = outcome {
            for change in changes {
                self.put_session(change.session.clone());
            }
        }
    }

    pub fn put_session(&mut self, session: AttendanceSession) {
        match self
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session.session_id)
        {
            Some(slot) => *slot = session,
            None => self.sessions.push(session),
        }
    }

    pub fn push_raw(&mut self, record: RawAttendanceRecord) {
        self.raw.push(record);
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A new open session.
    Opened,
    /// An open session received its check-out.
    Closed,
    /// A new closed session with a synthesized check-in.
    InferredCheckIn,
    /// A stale open session closed so a newer one can open.
    StaleClosed,
}

/// One session write. `session` is the full post-change record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionChange {
    pub kind: ChangeKind,
    pub session: AttendanceSession,
}

/// Why a punch changed nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IgnoreReason {
    /// A session already checked in on the punch's day.
    CheckInAlreadyRecorded,
    /// Shift-driven check-out candidate with no open session at all.
    NoOpenSession,
    /// Shift-driven check-out candidate too far from the open session.
    UnmatchedCheckout,
    /// Check-out earlier than the open session's check-in.
    CheckOutBeforeCheckIn,
    /// Check-in earlier than the employee's currently open session.
    PrecedesOpenSession,
    /// Label-driven punch with no Check In / Check Out label.
    UnlabeledPunch,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::CheckInAlreadyRecorded => "check_in_already_recorded",
            IgnoreReason::NoOpenSession => "no_open_session",
            IgnoreReason::UnmatchedCheckout => "unmatched_checkout",
            IgnoreReason::CheckOutBeforeCheckIn => "check_out_before_check_in",
            IgnoreReason::PrecedesOpenSession => "precedes_open_session",
            IgnoreReason::UnlabeledPunch => "unlabeled_punch",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied(Vec<SessionChange>),
    Ignored(IgnoreReason),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn changes(&self) -> &[SessionChange] {
        match self {
            Outcome::Applied(c) => c,
            Outcome::Ignored(_) => &[],
        }
    }

    pub fn ignored_reason(&self) -> Option<IgnoreReason> {
        match self {
            Outcome::Ignored(r) => Some(*r),
            Outcome::Applied(_) => None,
        }
    }
}
