use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The wall-clock time is skipped by a DST transition in that zone.
    #[error("{time} does not exist in {timezone}")]
    NonexistentLocalTime {
        time: NaiveDateTime,
        timezone: String,
    },
}
