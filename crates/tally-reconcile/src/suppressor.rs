use chrono::{DateTime, Duration, Utc};
use tally_schemas::RawAttendanceRecord;
use uuid::Uuid;

use crate::ReconciliationPolicy;

/// How close two punches must be to count as the same physical event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateTolerance {
    /// Same instant, compared at whole-second resolution.
    ExactSecond,
    /// Within `±window`, bounds inclusive.
    Window(Duration),
}

impl DuplicateTolerance {
    /// Webhook deliveries are exact retries; bulk downloads drift by clock skew.
    pub fn for_policy(policy: ReconciliationPolicy, bulk_window: Duration) -> Self {
        match policy {
            ReconciliationPolicy::LabelDriven => DuplicateTolerance::ExactSecond,
            ReconciliationPolicy::ShiftDriven => DuplicateTolerance::Window(bulk_window),
        }
    }

    fn matches(&self, recorded: DateTime<Utc>, candidate: DateTime<Utc>) -> bool {
        match self {
            DuplicateTolerance::ExactSecond => recorded.timestamp() == candidate.timestamp(),
            DuplicateTolerance::Window(w) => (recorded - candidate).abs() <= *w,
        }
    }
}

/// `true` if `history` already holds a punch for `employee_id` that
/// `tolerance` treats as the same event as `at`.
pub fn is_duplicate(
    history: &[RawAttendanceRecord],
    employee_id: Uuid,
    at: DateTime<Utc>,
    tolerance: DuplicateTolerance,
) -> bool {
    history
        .iter()
        .filter(|r| r.employee_id == employee_id)
        .any(|r| tolerance.matches(r.punched_at_utc, at))
}
