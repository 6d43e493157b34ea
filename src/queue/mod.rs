//! The three work queues and the engine loop that drains them.
//!
//! Every side effect the engine performs originates here: an event handler
//! enqueues a job row, and the scheduler picks rows one at a time, runs the
//! matching handler against a checkpointed store, and commits or rolls back
//! the result. See [`scheduler::Scheduler`].

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::store::LockTable;

pub mod job;
pub mod policy;
pub mod scheduler;

pub use job::{JobEnvelope, JobTable, PROCESS_LIMIT};
pub use policy::{JobError, JobOutcome, RetryPolicy};
pub use scheduler::Scheduler;

/// Everything a job handler needs besides the store: the gateways, the
/// advisory PR locks, configuration, and the wall-clock instant the tick is
/// running at. Handlers never call `Utc::now()` themselves, which keeps them
/// deterministic under test.
pub struct JobContext<'a, V, F> {
    pub vcs: &'a V,
    pub forge: &'a F,
    pub locks: &'a LockTable,
    pub config: &'a Config,
    pub now: DateTime<Utc>,
}
