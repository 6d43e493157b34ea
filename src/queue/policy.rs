//! Job outcomes, the error taxonomy, and per-queue failure policy.
//!
//! Every failure is caught at the single-job-execution boundary; nothing
//! escapes to crash the scheduler. The taxonomy:
//!
//! - **Transient** (network/API 5xx, lock contention): rolled back and
//!   retried under the queue's [`RetryPolicy`] until starved.
//! - **Hard** (data inconsistency, safety-policy refusal): rolled back,
//!   logged, and the job is deleted; recovery requires a fresh triggering
//!   event. Handlers post a human-readable notice on the affected PRs before
//!   returning a hard error.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::gateway::{GatewayError, GatewayErrorKind};

use super::job::JobEnvelope;

/// What a handler reports when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job is finished; delete it.
    Done,

    /// Nothing to do yet; run again at the given instant. Unlike a failure,
    /// this does not bump `sequence`.
    Reschedule(DateTime<Utc>),
}

/// A failed job attempt.
#[derive(Debug, Error)]
pub enum JobError {
    /// Retryable failure; all store changes from this attempt are rolled
    /// back and the queue's policy decides the next attempt.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Non-retryable failure; the job is deleted and a new triggering event
    /// is required.
    #[error("aborted: {0}")]
    Hard(String),
}

impl From<GatewayError> for JobError {
    fn from(err: GatewayError) -> Self {
        match err.kind {
            GatewayErrorKind::Transient => JobError::Transient(err.to_string()),
            GatewayErrorKind::Permanent => JobError::Hard(err.to_string()),
        }
    }
}

/// Per-queue failure policy: how a transient failure reshapes the job row.
///
/// Default behavior is a bare `sequence` bump with `retry_after` untouched,
/// i.e. immediate retry until starved. Queues that talk to slow-moving
/// external state (the forward-port queue) add a backoff delay instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay added to `retry_after` on each failure; `None` retries
    /// immediately.
    pub backoff: Option<Duration>,
}

impl RetryPolicy {
    /// Immediate retry (bump `sequence` only).
    pub fn immediate() -> Self {
        RetryPolicy { backoff: None }
    }

    /// Retry after a fixed delay.
    pub fn delayed(backoff: Duration) -> Self {
        RetryPolicy {
            backoff: Some(backoff),
        }
    }

    /// Applies this policy to a job row after a failed attempt.
    pub fn on_failure<P>(&self, env: &mut JobEnvelope<P>, now: DateTime<Utc>, error: &str) {
        env.sequence += 1;
        if let Some(backoff) = self.backoff {
            env.retry_after = now + backoff;
        }
        env.last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobId;

    #[test]
    fn immediate_policy_bumps_sequence_only() {
        let now = Utc::now();
        let mut env = JobEnvelope::new(JobId(1), (), now);
        RetryPolicy::immediate().on_failure(&mut env, now, "boom");
        assert_eq!(env.sequence, 1);
        assert_eq!(env.retry_after, now);
        assert_eq!(env.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn delayed_policy_pushes_retry_after() {
        let now = Utc::now();
        let mut env = JobEnvelope::new(JobId(1), (), now);
        RetryPolicy::delayed(Duration::hours(1)).on_failure(&mut env, now, "boom");
        assert_eq!(env.sequence, 1);
        assert_eq!(env.retry_after, now + Duration::hours(1));
    }

    #[test]
    fn sequence_is_non_decreasing_over_attempts() {
        let now = Utc::now();
        let mut env = JobEnvelope::new(JobId(1), (), now);
        let policy = RetryPolicy::delayed(Duration::hours(1));
        let mut prev = env.sequence;
        for i in 0..12 {
            policy.on_failure(&mut env, now + Duration::minutes(i), "err");
            assert!(env.sequence > prev);
            prev = env.sequence;
        }
    }

    #[test]
    fn gateway_errors_map_to_taxonomy() {
        let t: JobError = GatewayError::transient("503").into();
        assert!(matches!(t, JobError::Transient(_)));
        let h: JobError = GatewayError::permanent("bad ref").into();
        assert!(matches!(h, JobError::Hard(_)));
    }
}
