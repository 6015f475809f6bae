use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tally_schemas::{EmployeeCalendar, WorkInterval};

use crate::CalendarError;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Fixed day-boundary policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayPolicy {
    /// Local punches strictly before this time belong to the previous date.
    pub previous_day_cutoff: NaiveTime,
}

impl Default for DayPolicy {
    fn default() -> Self {
        Self {
            previous_day_cutoff: NaiveTime::from_hms_opt(4, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A punch placed on the employee's local clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayResolution {
    /// Local wall-clock instant.
    pub local: NaiveDateTime,
    /// Literal local calendar date.
    pub local_date: NaiveDate,
    /// Date the punch is attributed to after the previous-day cutoff.
    pub work_day: NaiveDate,
}

/// Day resolution plus calendar membership (bulk path).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShiftResolution {
    pub day: DayResolution,
    pub inside_shift: bool,
    /// Local date the matching interval is anchored on. Differs from
    /// `day.local_date` when an overnight interval runs past midnight.
    pub shift_day: Option<NaiveDate>,
}

/// Inclusive UTC bounds of a local span, to the second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayWindow {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_utc <= at && at <= self.end_utc
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves punches for one employee zone. Cheap to build per punch.
#[derive(Clone, Copy, Debug)]
pub struct DayResolver {
    tz: Tz,
    policy: DayPolicy,
}

impl DayResolver {
    pub fn new(tz: Tz, policy: DayPolicy) -> Self {
        Self { tz, policy }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.with_timezone(&self.tz).naive_local()
    }

    /// Work-day assignment (webhook path).
    pub fn resolve_day(&self, at: DateTime<Utc>) -> DayResolution {
        let local = self.local(at);
        DayResolution {
            local,
            local_date: local.date(),
            work_day: work_day(local, self.policy.previous_day_cutoff),
        }
    }

    /// Work-day assignment plus shift membership (bulk path).
    ///
    /// Fails with [`CalendarError::NoCalendarAssigned`] when `calendar` is absent.
    pub fn resolve_shift(
        &self,
        at: DateTime<Utc>,
        calendar: Option<&EmployeeCalendar>,
    ) -> Result<ShiftResolution, CalendarError> {
        let calendar = calendar.ok_or(CalendarError::NoCalendarAssigned)?;
        let day = self.resolve_day(at);
        let shift_day = matching_shift_day(calendar, day.local);
        Ok(ShiftResolution {
            day,
            inside_shift: shift_day.is_some(),
            shift_day,
        })
    }

    /// UTC window covering the whole local `date`.
    pub fn day_window(&self, date: NaiveDate) -> DayWindow {
        let start = date.and_time(NaiveTime::MIN);
        let end = date.and_hms_opt(23, 59, 59).unwrap_or(start);
        DayWindow {
            start_utc: self.at_local(start),
            end_utc: self.at_local(end),
        }
    }

    /// UTC window of work day `date`: from `date` at the previous-day
    /// cutoff up to one second before the cutoff on the following date.
    ///
    /// Every punch whose [`work_day`] is `date` falls inside it.
    pub fn work_day_window(&self, date: NaiveDate) -> DayWindow {
        let cutoff = self.policy.previous_day_cutoff;
        let next = date.succ_opt().unwrap_or(date);
        let start_utc = self.at_local_time(date, cutoff);
        let end_utc = (self.at_local_time(next, cutoff) - Duration::seconds(1)).max(start_utc);
        DayWindow { start_utc, end_utc }
    }

    /// UTC instant of local `date` at `time`.
    pub fn at_local_time(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        self.at_local(date.and_time(time))
    }

    /// UTC instant of a local wall-clock value.
    ///
    /// Ambiguous wall-clock times (DST fall-back) take the earlier instant.
    /// Non-existent ones (DST spring-forward gap) step one hour forward.
    pub fn at_local(&self, local: NaiveDateTime) -> DateTime<Utc> {
        if let Some(dt) = self.tz.from_local_datetime(&local).earliest() {
            return dt.with_timezone(&Utc);
        }
        let shifted = local + Duration::hours(1);
        match self.tz.from_local_datetime(&shifted).earliest() {
            Some(dt) => dt.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&local),
        }
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Date a local punch is attributed to.
pub fn work_day(local: NaiveDateTime, previous_day_cutoff: NaiveTime) -> NaiveDate {
    let date = local.date();
    if local.time() < previous_day_cutoff {
        date.pred_opt().unwrap_or(date)
    } else {
        date
    }
}

/// `true` if `local` falls inside any working interval, bounds inclusive.
pub fn is_inside_shift(calendar: &EmployeeCalendar, local: NaiveDateTime) -> bool {
    matching_shift_day(calendar, local).is_some()
}

/// Anchor date of the first working interval containing `local`.
///
/// Intervals of the punch's weekday are laid onto its local date. Overnight
/// intervals of the previous weekday are laid onto the previous date, so a
/// Friday 22:00–06:00 interval covers Saturday 05:30.
pub fn matching_shift_day(calendar: &EmployeeCalendar, local: NaiveDateTime) -> Option<NaiveDate> {
    let date = local.date();
    let same_day = calendar
        .intervals_on(date.weekday())
        .map(|i| (date, interval_span(i, date)));
    let carried = date.pred_opt().into_iter().flat_map(|prev| {
        calendar
            .intervals_on(prev.weekday())
            .filter(|i| i.is_overnight())
            .map(move |i| (prev, interval_span(i, prev)))
    });
    same_day
        .chain(carried)
        .find(|(_, (start, end))| *start <= local && local <= *end)
        .map(|(anchor, _)| anchor)
}

/// Absolute local bounds of `interval` anchored on `date`.
pub fn interval_span(interval: &WorkInterval, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(interval.start);
    let mut end = date.and_time(interval.end);
    if interval.is_overnight() {
        end += Duration::days(1);
    }
    (start, end)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
