//! The in-memory table of pending jobs and their timers.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use courier_common::{EmailRequest, tracing};
use courier_delivery::Dispatch;
use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::{JobId, ScheduledJob, SchedulerError, timezone};

struct PendingJob {
    job: ScheduledJob,
    /// Insertion order, to break ties between equal trigger times.
    sequence: u64,
    cancel: oneshot::Sender<()>,
}

/// Holds deferred requests until they are due, then hands them to a [`Dispatch`].
///
/// Each job gets its own timer task. A job leaves the table exactly once:
/// either the timer removes it just before dispatching, or [`Scheduler::cancel`]
/// removes it and disarms the timer. Whichever removes it first wins.
///
/// Jobs live only in memory and are lost when the process exits.
///
/// Scheduling spawns onto the current tokio runtime, so it must be called
/// from within one.
pub struct Scheduler {
    jobs: Arc<DashMap<JobId, PendingJob>>,
    dispatcher: Arc<dyn Dispatch>,
    sequence: AtomicU64,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            dispatcher,
            sequence: AtomicU64::new(0),
        }
    }

    /// Schedules `request` for the wall-clock time `trigger` in `timezone`.
    ///
    /// A trigger time in the past fires immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone is unknown or the time does not exist in it.
    pub fn schedule(
        &self,
        request: EmailRequest,
        trigger: NaiveDateTime,
        timezone: &str,
    ) -> Result<ScheduledJob, SchedulerError> {
        let trigger_time = timezone::resolve(trigger, timezone)?;
        Ok(self.schedule_at(request, trigger_time))
    }

    /// Schedules `request` for an already resolved instant.
    pub fn schedule_at(
        &self,
        request: EmailRequest,
        trigger_time: DateTime<FixedOffset>,
    ) -> ScheduledJob {
        let job = ScheduledJob {
            id: JobId::generate(),
            trigger_time,
            payload: request,
        };
        let (cancel, cancelled) = oneshot::channel();

        // The entry must exist before the timer can possibly fire.
        self.jobs.insert(
            job.id.clone(),
            PendingJob {
                job: job.clone(),
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                cancel,
            },
        );

        let delay = (trigger_time.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        tokio::spawn(Self::timer(
            job.id.clone(),
            delay,
            cancelled,
            Arc::clone(&self.jobs),
            Arc::clone(&self.dispatcher),
        ));

        tracing::info!(
            job = %job.id,
            trigger_time = %job.trigger_time.to_rfc3339(),
            recipients = %job.payload.recipient_list(),
            "Scheduled email"
        );

        job
    }

    async fn timer(
        id: JobId,
        delay: Duration,
        cancelled: oneshot::Receiver<()>,
        jobs: Arc<DashMap<JobId, PendingJob>>,
        dispatcher: Arc<dyn Dispatch>,
    ) {
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = cancelled => return,
        }

        let Some((_, pending)) = jobs.remove(&id) else {
            return;
        };

        tracing::info!(job = %id, "Scheduled email is due, dispatching");
        if dispatcher.send(&pending.job.payload).await {
            tracing::info!(job = %id, "Scheduled email sent");
        } else {
            tracing::warn!(job = %id, "Scheduled email could not be delivered");
        }
    }

    /// Snapshot of pending jobs, earliest first, ties in scheduling order.
    pub fn list(&self) -> Vec<ScheduledJob> {
        let mut pending: Vec<_> = self
            .jobs
            .iter()
            .map(|entry| (entry.job.trigger_time, entry.sequence, entry.job.clone()))
            .collect();

        pending.sort_by_key(|(trigger_time, sequence, _)| (*trigger_time, *sequence));
        pending.into_iter().map(|(_, _, job)| job).collect()
    }

    pub fn get(&self, id: &str) -> Option<ScheduledJob> {
        self.jobs.get(id).map(|entry| entry.job.clone())
    }

    /// Cancels a pending job. Returns `false` if there is no such job, which
    /// includes jobs that have already fired.
    pub fn cancel(&self, id: &str) -> bool {
        let Some((id, pending)) = self.jobs.remove(id) else {
            return false;
        };

        // The timer may have just woken and be waiting on the map; it will
        // find the entry gone either way.
        let _ = pending.cancel.send(());
        tracing::info!(job = %id, "Cancelled scheduled email");
        true
    }

    /// Cancels every pending job, returning how many there were.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<JobId> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        let cancelled = ids.iter().filter(|id| self.cancel(id.as_str())).count();

        if cancelled > 0 {
            tracing::warn!("Discarded {cancelled} pending scheduled emails");
        }
        cancelled
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
