use std::{borrow::Borrow, fmt};

use chrono::{DateTime, FixedOffset};
use courier_common::EmailRequest;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque identifier of a pending job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A request waiting for its trigger time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledJob {
    pub id: JobId,
    /// Absolute instant, with the offset the requested zone had at that moment.
    pub trigger_time: DateTime<FixedOffset>,
    pub payload: EmailRequest,
}
