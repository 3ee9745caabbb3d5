//! Deferred delivery: requests held in memory until a wall-clock time in a
//! named timezone, then handed to a [`Dispatch`](courier_delivery::Dispatch).

mod error;
mod job;
mod scheduler;
pub mod timezone;

pub use error::SchedulerError;
pub use job::{JobId, ScheduledJob};
pub use scheduler::Scheduler;
