//! Retryable job rows and per-queue tables.
//!
//! A job row is created by the event it serves and deleted on success. On
//! failure it survives with an incremented `sequence` and whatever
//! `retry_after` the queue's policy picked, so a persistently failing job
//! sinks behind fresh work and is eventually starved (invisible to the
//! scheduler once `sequence` reaches [`PROCESS_LIMIT`]) while remaining
//! queryable for diagnostics.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// A job becomes ineligible for scheduling after this many failed attempts.
/// The row itself is kept for diagnostics.
pub const PROCESS_LIMIT: u32 = 10;

/// A queued job: payload plus retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope<P> {
    pub id: JobId,

    pub created_at: DateTime<Utc>,

    /// Not scheduled before this instant.
    pub retry_after: DateTime<Utc>,

    /// Failed-attempt counter, doubling as scheduling priority: lower runs
    /// first, so failing jobs sink behind fresh ones.
    pub sequence: u32,

    /// Message of the most recent failure, for diagnostics.
    pub last_error: Option<String>,

    pub payload: P,
}

impl<P> JobEnvelope<P> {
    pub fn new(id: JobId, payload: P, now: DateTime<Utc>) -> Self {
        JobEnvelope {
            id,
            created_at: now,
            retry_after: now,
            sequence: 0,
            last_error: None,
            payload,
        }
    }

    /// True once the job has exhausted its retry budget.
    pub fn is_starved(&self) -> bool {
        self.sequence >= PROCESS_LIMIT
    }

    /// True while the scheduler may pick this job.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        !self.is_starved() && self.retry_after <= now
    }

    /// True once backoff has pushed the job past its grace window
    /// (`retry_after > created_at + grace`). Such a job is considered stuck
    /// and needs manual intervention; queues may use this to hide it from
    /// scheduling before [`PROCESS_LIMIT`] is reached.
    pub fn cannot_apply(&self, grace: Duration) -> bool {
        self.retry_after > self.created_at + grace
    }
}

/// One queue type's job table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTable<P> {
    jobs: Vec<JobEnvelope<P>>,
}

impl<P> Default for JobTable<P> {
    fn default() -> Self {
        JobTable { jobs: Vec::new() }
    }
}

impl<P> JobTable<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn enqueue(&mut self, env: JobEnvelope<P>) {
        self.jobs.push(env);
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobEnvelope<P>> {
        self.jobs.iter()
    }

    pub fn get(&self, id: JobId) -> Option<&JobEnvelope<P>> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut JobEnvelope<P>> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    pub fn remove(&mut self, id: JobId) -> Option<JobEnvelope<P>> {
        let idx = self.jobs.iter().position(|j| j.id == id)?;
        Some(self.jobs.remove(idx))
    }

    /// Selects the single oldest eligible job: ready now, passing the
    /// queue-specific `visible` filter, ordered by `(sequence, created_at,
    /// id)`.
    pub fn next_ready(
        &self,
        now: DateTime<Utc>,
        visible: impl Fn(&JobEnvelope<P>) -> bool,
    ) -> Option<&JobEnvelope<P>> {
        self.jobs
            .iter()
            .filter(|j| j.is_ready(now) && visible(j))
            .min_by_key(|j| (j.sequence, j.created_at, j.id))
    }
}
