//! tally-calendar
//!
//! Day / shift resolution for punches.
//!
//! Deterministic, pure logic. No IO, no wall-clock. The caller supplies the
//! UTC instant, the employee's zone and (for shift membership) the employee's
//! weekly calendar.
//!
//! Two questions are answered here:
//! - **Which work-day does a punch belong to?** Punches before the configured
//!   cutoff (04:00 by default) count for the previous calendar date, so a
//!   01:00 punch closes out the previous evening.
//! - **Is the punch inside a working interval?** Each weekly interval is laid
//!   onto the punch's local date; overnight intervals (`end < start`) run into
//!   the next day.

mod resolver;

pub use resolver::*;

use chrono_tz::Tz;

/// Errors raised while resolving a punch against a calendar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    /// The zone name is not a known IANA zone.
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    /// Shift-driven reconciliation needs a calendar and none is assigned.
    #[error("no work calendar assigned")]
    NoCalendarAssigned,
}

/// Parse an IANA zone name (`"America/Mexico_City"`, `"UTC"`).
pub fn parse_tz(name: &str) -> Result<Tz, CalendarError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| CalendarError::UnknownTimezone(name.to_string()))
}
