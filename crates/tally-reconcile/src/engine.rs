use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tally_calendar::{CalendarError, DayResolver};
use tally_schemas::{AttendanceSession, EmployeeCalendar, PunchEvent, PunchKind};

use crate::{
    ChangeKind, EmployeeLedger, IgnoreReason, Outcome, ReconcileParams, ReconciliationPolicy,
    SessionChange,
};

/// Session state machine for one employee zone.
///
/// `NoSession -> Open -> Closed`. A closed session is never reopened. Both
/// policies share the open and close transitions and differ only in how a
/// punch is classified.
#[derive(Clone, Copy, Debug)]
pub struct Reconciler {
    resolver: DayResolver,
    params: ReconcileParams,
}

impl Reconciler {
    pub fn new(tz: Tz, params: ReconcileParams) -> Self {
        Self {
            resolver: DayResolver::new(tz, params.day),
            params,
        }
    }

    pub fn resolver(&self) -> &DayResolver {
        &self.resolver
    }

    /// Smallest UTC span a decision about a punch at `at` reads, widened by
    /// `slack` on both sides.
    ///
    /// Covers the punch's work-day window and the local dates a shift match
    /// can anchor on. The open session is loaded separately.
    pub fn ledger_span(&self, at: DateTime<Utc>, slack: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
        let day = self.resolver.resolve_day(at);
        let work = self.resolver.work_day_window(day.work_day);
        let today = self.resolver.day_window(day.local_date);
        let yesterday = day
            .local_date
            .pred_opt()
            .map_or(today, |d| self.resolver.day_window(d));
        let from = work.start_utc.min(yesterday.start_utc).min(at);
        let to = work.end_utc.max(today.end_utc).max(at);
        (from - slack, to + slack)
    }

    /// Decide and apply in one step.
    pub fn reconcile(
        &self,
        ledger: &mut EmployeeLedger,
        punch: &PunchEvent,
        policy: ReconciliationPolicy,
        calendar: Option<&EmployeeCalendar>,
    ) -> Result<Outcome, CalendarError> {
        let outcome = self.decide(ledger, punch, policy, calendar)?;
        ledger.apply(&outcome);
        Ok(outcome)
    }

    /// Pure decision: `ledger` is not touched.
    ///
    /// Fails only when the shift-driven policy has no calendar to consult.
    pub fn decide(
        &self,
        ledger: &EmployeeLedger,
        punch: &PunchEvent,
        policy: ReconciliationPolicy,
        calendar: Option<&EmployeeCalendar>,
    ) -> Result<Outcome, CalendarError> {
        match policy {
            ReconciliationPolicy::LabelDriven => Ok(self.label_driven(ledger, punch)),
            ReconciliationPolicy::ShiftDriven => self.shift_driven(ledger, punch, calendar),
        }
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    fn label_driven(&self, ledger: &EmployeeLedger, punch: &PunchEvent) -> Outcome {
        let at = punch.at_utc;
        let work_day = self.resolver.resolve_day(at).work_day;
        let window = self.resolver.work_day_window(work_day);

        match punch.kind {
            PunchKind::CheckIn => {
                if ledger.has_check_in_between(window.start_utc, window.end_utc) {
                    return Outcome::Ignored(IgnoreReason::CheckInAlreadyRecorded);
                }
                self.open(ledger, at)
            }
            PunchKind::CheckOut => match ledger.open_session() {
                Some(open) if window.contains(open.check_in_utc) => {
                    if at < open.check_in_utc {
                        Outcome::Ignored(IgnoreReason::CheckOutBeforeCheckIn)
                    } else {
                        Outcome::Applied(vec![close(open, at)])
                    }
                }
                _ => {
                    let synthesized = self
                        .resolver
                        .at_local_time(work_day, self.params.inferred_check_in)
                        .min(at);
                    let mut session = AttendanceSession::open(ledger.employee_id, synthesized);
                    session.check_out_utc = Some(at);
                    session.check_in_inferred = true;
                    Outcome::Applied(vec![SessionChange {
                        kind: ChangeKind::InferredCheckIn,
                        session,
                    }])
                }
            },
            PunchKind::Unknown => Outcome::Ignored(IgnoreReason::UnlabeledPunch),
        }
    }

    fn shift_driven(
        &self,
        ledger: &EmployeeLedger,
        punch: &PunchEvent,
        calendar: Option<&EmployeeCalendar>,
    ) -> Result<Outcome, CalendarError> {
        let at = punch.at_utc;
        let shift = self.resolver.resolve_shift(at, calendar)?;
        let local_date = shift.day.local_date;

        if let Some(shift_day) = shift.shift_day {
            let window = self.resolver.day_window(shift_day);
            if ledger.has_check_in_between(window.start_utc, window.end_utc) {
                return Ok(Outcome::Ignored(IgnoreReason::CheckInAlreadyRecorded));
            }
            return Ok(self.open(ledger, at));
        }

        let Some(open) = ledger.open_session() else {
            return Ok(Outcome::Ignored(IgnoreReason::NoOpenSession));
        };
        if at < open.check_in_utc {
            return Ok(Outcome::Ignored(IgnoreReason::CheckOutBeforeCheckIn));
        }

        let opened_on = self.resolver.local(open.check_in_utc).date();
        let same_day = opened_on == local_date;
        let late_checkout = opened_on.succ_opt() == Some(local_date)
            && shift.day.local.time() <= self.params.late_checkout_cutoff;

        if same_day || late_checkout {
            Ok(Outcome::Applied(vec![close(open, at)]))
        } else {
            Ok(Outcome::Ignored(IgnoreReason::UnmatchedCheckout))
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Open a session at `at`, first closing any stale open session so the
    /// employee never holds two.
    fn open(&self, ledger: &EmployeeLedger, at: DateTime<Utc>) -> Outcome {
        let mut changes = Vec::with_capacity(2);
        if let Some(stale) = ledger.open_session() {
            if stale.check_in_utc > at {
                return Outcome::Ignored(IgnoreReason::PrecedesOpenSession);
            }
            changes.push(self.close_stale(stale, at));
        }
        changes.push(SessionChange {
            kind: ChangeKind::Opened,
            session: AttendanceSession::open(ledger.employee_id, at),
        });
        Outcome::Applied(changes)
    }

    /// Close `stale` at the end of its own work-day, never past `next`
    /// and never before its check-in.
    fn close_stale(&self, stale: &AttendanceSession, next: DateTime<Utc>) -> SessionChange {
        let work_day = self.resolver.resolve_day(stale.check_in_utc).work_day;
        let end = self.resolver.work_day_window(work_day).end_utc;
        let mut session = stale.clone();
        session.check_out_utc = Some(end.min(next).max(stale.check_in_utc));
        session.check_out_inferred = true;
        SessionChange {
            kind: ChangeKind::StaleClosed,
            session,
        }
    }
}

fn close(open: &AttendanceSession, at: DateTime<Utc>) -> SessionChange {
    let mut session = open.clone();
    session.check_out_utc = Some(at);
    SessionChange {
        kind: ChangeKind::Closed,
        session,
    }
}
