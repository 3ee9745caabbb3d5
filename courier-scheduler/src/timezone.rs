//! Turning a wall-clock time in a named zone into an absolute instant.

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::SchedulerError;

/// Looks up an IANA zone by name.
///
/// # Errors
///
/// `InvalidTimezone` if the name is not in the zone database.
pub fn parse(timezone: &str) -> Result<Tz, SchedulerError> {
    timezone
        .parse()
        .map_err(|_| SchedulerError::InvalidTimezone(timezone.to_string()))
}

/// Resolves `naive` as a local time in the IANA zone `timezone`.
///
/// A time repeated by a DST fall-back resolves to its earlier occurrence.
///
/// # Errors
///
/// `InvalidTimezone` for an unknown zone name, `NonexistentLocalTime` for a
/// time skipped by a DST spring-forward.
pub fn resolve(
    naive: NaiveDateTime,
    timezone: &str,
) -> Result<DateTime<FixedOffset>, SchedulerError> {
    match parse(timezone)?.from_local_datetime(&naive) {
        LocalResult::Single(time) | LocalResult::Ambiguous(time, _) => Ok(time.fixed_offset()),
        LocalResult::None => Err(SchedulerError::NonexistentLocalTime {
            time: naive,
            timezone: timezone.to_string(),
        }),
    }
}
