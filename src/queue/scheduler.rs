//! The engine loop: pick one job, run it transactionally, repeat.
//!
//! The scheduler owns the [`Store`] and is the only thing that mutates it.
//! Each attempt runs against the live store with a full checkpoint taken
//! first; on any failure the checkpoint is restored wholesale, so a handler
//! never has to undo its own partial writes. External side effects (pushes,
//! PR creation) are guarded separately, by per-ref compare-and-swap on the
//! git side and by advisory PR locks on the cascade side.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::events::{self, EngineEvent};
use crate::gateway::{ForgeGateway, VcsGateway};
use crate::store::{snapshot, LockTable, Store};
use crate::{cascade, port, retire};

use super::policy::{JobError, JobOutcome, RetryPolicy};
use super::JobContext;

pub struct Scheduler<V, F> {
    pub store: Store,
    vcs: V,
    forge: F,
    config: Config,
    locks: LockTable,
}

impl<V: VcsGateway, F: ForgeGateway> Scheduler<V, F> {
    pub fn new(store: Store, vcs: V, forge: F, config: Config) -> Self {
        Scheduler {
            store,
            vcs,
            forge,
            config,
            locks: LockTable::new(),
        }
    }

    /// Drives the engine until cancellation: ingest events as they arrive,
    /// drain the queues, and wake periodically for jobs whose `retry_after`
    /// has come due.
    pub async fn run(
        mut self,
        mut events_rx: mpsc::UnboundedReceiver<EngineEvent>,
        cancel: CancellationToken,
    ) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.tick_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("engine shutting down");
                    break;
                }
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        tracing::info!("event channel closed, engine shutting down");
                        break;
                    };
                    events::ingest(&mut self.store, &self.config, Utc::now(), event);
                    self.drain().await;
                    self.persist();
                }
                _ = interval.tick() => {
                    if self.drain().await {
                        self.persist();
                    }
                }
            }
        }
    }

    /// Runs ticks until no queue has an eligible job. Returns whether any
    /// job ran.
    async fn drain(&mut self) -> bool {
        let mut worked = false;
        while self.tick(Utc::now()).await {
            worked = true;
        }
        worked
    }

    /// Runs at most one ready job from each of the three queues, so a busy
    /// port queue cannot starve updates or retirements within a drain.
    /// Returns true if any job ran to completion or failure (i.e. the queues
    /// may have more work).
    pub async fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let ported = self.tick_port(now).await;
        let updated = self.tick_update(now).await;
        let retired = self.tick_retire(now).await;
        ported || updated || retired
    }

    async fn tick_port(&mut self, now: DateTime<Utc>) -> bool {
        let grace = self.config.port_grace();
        // Jobs whose backoff has escaped the grace window are stuck waiting
        // for manual intervention; hide them without deleting the row.
        let Some(env) = self
            .store
            .port_jobs
            .next_ready(now, |j| !j.cannot_apply(grace))
            .cloned()
        else {
            return false;
        };

        let checkpoint = self.store.clone();
        let ctx = JobContext {
            vcs: &self.vcs,
            forge: &self.forge,
            locks: &self.locks,
            config: &self.config,
            now,
        };
        let result = port::job::run(&mut self.store, &ctx, &env.payload).await;
        let policy = RetryPolicy::delayed(self.config.port_retry_delay());

        match result {
            Ok(JobOutcome::Done) => {
                self.store.port_jobs.remove(env.id);
                true
            }
            Ok(JobOutcome::Reschedule(at)) => {
                if let Some(row) = self.store.port_jobs.get_mut(env.id) {
                    row.retry_after = at;
                }
                false
            }
            Err(JobError::Transient(msg)) => {
                self.store = checkpoint;
                tracing::warn!(job = %env.id, batch = %env.payload.batch, error = %msg,
                    "forward-port attempt failed, will retry");
                if let Some(row) = self.store.port_jobs.get_mut(env.id) {
                    policy.on_failure(row, now, &msg);
                }
                true
            }
            Err(JobError::Hard(msg)) => {
                self.store = checkpoint;
                tracing::error!(job = %env.id, batch = %env.payload.batch, error = %msg,
                    "forward-port job aborted");
                self.store.port_jobs.remove(env.id);
                true
            }
        }
    }

    async fn tick_update(&mut self, now: DateTime<Utc>) -> bool {
        let Some(env) = self.store.update_jobs.next_ready(now, |_| true).cloned() else {
            return false;
        };

        let checkpoint = self.store.clone();
        let ctx = JobContext {
            vcs: &self.vcs,
            forge: &self.forge,
            locks: &self.locks,
            config: &self.config,
            now,
        };
        let result = cascade::job::run(&mut self.store, &ctx, &env.payload).await;

        match result {
            Ok(JobOutcome::Done) => {
                self.store.update_jobs.remove(env.id);
                true
            }
            Ok(JobOutcome::Reschedule(at)) => {
                if let Some(row) = self.store.update_jobs.get_mut(env.id) {
                    row.retry_after = at;
                }
                false
            }
            Err(JobError::Transient(msg)) => {
                self.store = checkpoint;
                tracing::warn!(job = %env.id, pr = %env.payload.new_root, error = %msg,
                    "update cascade attempt failed, will retry");
                if let Some(row) = self.store.update_jobs.get_mut(env.id) {
                    RetryPolicy::immediate().on_failure(row, now, &msg);
                }
                true
            }
            Err(JobError::Hard(msg)) => {
                self.store = checkpoint;
                tracing::error!(job = %env.id, pr = %env.payload.new_root, error = %msg,
                    "update cascade job aborted");
                self.store.update_jobs.remove(env.id);
                true
            }
        }
    }

    async fn tick_retire(&mut self, now: DateTime<Utc>) -> bool {
        let Some(env) = self.store.retire_jobs.next_ready(now, |_| true).cloned() else {
            return false;
        };

        let checkpoint = self.store.clone();
        let ctx = JobContext {
            vcs: &self.vcs,
            forge: &self.forge,
            locks: &self.locks,
            config: &self.config,
            now,
        };
        let result = retire::run(&mut self.store, &ctx, &env.payload).await;

        match result {
            Ok(JobOutcome::Done) => {
                self.store.retire_jobs.remove(env.id);
                true
            }
            Ok(JobOutcome::Reschedule(at)) => {
                if let Some(row) = self.store.retire_jobs.get_mut(env.id) {
                    row.retry_after = at;
                }
                false
            }
            Err(JobError::Transient(msg)) => {
                self.store = checkpoint;
                tracing::warn!(job = %env.id, pr = %env.payload.pr, error = %msg,
                    "branch retirement attempt failed, will retry");
                if let Some(row) = self.store.retire_jobs.get_mut(env.id) {
                    RetryPolicy::immediate().on_failure(row, now, &msg);
                }
                true
            }
            Err(JobError::Hard(msg)) => {
                self.store = checkpoint;
                tracing::error!(job = %env.id, pr = %env.payload.pr, error = %msg,
                    "branch retirement job refused");
                self.store.retire_jobs.remove(env.id);
                true
            }
        }
    }

    fn persist(&self) {
        let Some(path) = &self.config.state_file else {
            return;
        };
        let snap = snapshot::QueueSnapshot::capture(&self.store);
        if let Err(e) = snapshot::save(path, &snap) {
            // The engine keeps running: in-memory state is still correct,
            // only crash recovery is degraded until the next save succeeds.
            tracing::error!(error = %e, path = %path.display(), "failed to persist queue snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retire::RetireRequest;
    use crate::test_utils::{seed_store, MockForge, MockVcs};
    use crate::types::PrState;
    use chrono::Duration;

    fn scheduler(store: Store) -> Scheduler<MockVcs, MockForge> {
        Scheduler::new(store, MockVcs::new(), MockForge::new(), Config::default())
    }

    #[tokio::test]
    async fn done_job_is_removed() {
        let (mut store, pr, _) = seed_store();
        // An open PR makes retirement a no-op that completes immediately.
        store.pr_mut(pr).unwrap().state = PrState::Opened;
        let now = Utc::now();
        store.enqueue_retire(RetireRequest { pr }, now, now);

        let mut sched = scheduler(store);
        assert!(sched.tick(now).await);
        assert!(sched.store.retire_jobs.is_empty());
    }

    #[tokio::test]
    async fn transient_failure_bumps_sequence_and_keeps_job() {
        let (mut store, pr, _) = seed_store();
        let now = Utc::now();
        {
            let row = store.pr_mut(pr).unwrap();
            row.state = PrState::Merged;
            row.closed_at = Some(now - Duration::days(30));
        }
        let head = store.pr(pr).unwrap().head_ref.clone();
        store.enqueue_retire(RetireRequest { pr }, now, now);

        let mut sched = scheduler(store);
        // The remote ref moved; deletion is lease-rejected.
        sched.vcs.reject_ref(head);

        assert!(sched.tick(now).await);
        let row = sched.store.retire_jobs.iter().next().unwrap();
        assert_eq!(row.sequence, 1);
        assert!(row.last_error.is_some());
    }

    #[tokio::test]
    async fn hard_failure_rolls_back_and_deletes_job() {
        let (mut store, pr, _) = seed_store();
        let now = Utc::now();
        {
            let row = store.pr_mut(pr).unwrap();
            row.state = PrState::Merged;
            row.closed_at = Some(now - Duration::days(30));
            // Head branch owned by someone else: retirement must refuse.
            row.label = "stranger:feature".to_string();
        }
        store.enqueue_retire(RetireRequest { pr }, now, now);

        let mut sched = scheduler(store);
        assert!(sched.tick(now).await);
        assert!(sched.store.retire_jobs.is_empty());
        // Nothing was deleted on the forge.
        assert!(sched.forge.deleted_branches().is_empty());
    }

    #[tokio::test]
    async fn reschedule_defers_without_bumping_sequence() {
        let (mut store, pr, _) = seed_store();
        let now = Utc::now();
        {
            let row = store.pr_mut(pr).unwrap();
            row.state = PrState::Merged;
            row.closed_at = Some(now);
        }
        store.enqueue_retire(RetireRequest { pr }, now, now);

        let mut sched = scheduler(store);
        assert!(!sched.tick(now).await);
        let row = sched.store.retire_jobs.iter().next().unwrap();
        assert_eq!(row.sequence, 0);
        assert!(row.retry_after > now);
    }

    #[tokio::test]
    async fn stuck_port_job_is_hidden_from_scheduling() {
        let (mut store, _, batch) = seed_store();
        let now = Utc::now();
        let id = store.enqueue_port(
            crate::port::PortRequest {
                batch,
                kind: crate::port::PortKind::FromMerge,
                pr: None,
            },
            now - Duration::days(3),
        );
        // Backoff has pushed the job far past its creation grace window.
        store.port_jobs.get_mut(id).unwrap().retry_after = now - Duration::hours(1);

        let mut sched = scheduler(store);
        assert!(!sched.tick(now).await);
        assert_eq!(sched.store.port_jobs.len(), 1);
    }

    #[tokio::test]
    async fn one_tick_services_every_queue() {
        let (mut store, pr, batch) = seed_store();
        let now = Utc::now();
        store.pr_mut(pr).unwrap().state = PrState::Merged;
        store.enqueue_port(
            crate::port::PortRequest {
                batch,
                kind: crate::port::PortKind::FromMerge,
                pr: None,
            },
            now,
        );
        store.enqueue_retire(RetireRequest { pr }, now, now);

        let mut sched = scheduler(store);
        assert!(sched.tick(now).await);

        // The port hop ran...
        assert_eq!(sched.store.batch_children(batch).len(), 1);
        // ...and retirement ran in the same tick instead of waiting behind
        // the port queue.
        assert!(sched.store.retire_jobs.is_empty());
    }

    #[tokio::test]
    async fn persist_is_skipped_without_a_state_file() {
        let (store, _, _) = seed_store();
        let sched = scheduler(store);
        sched.persist();
    }
}
