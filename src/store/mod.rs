//! Shared mutable engine state.
//!
//! The store holds the branch sequence, the PR/batch lineage graph, and the
//! three job tables. It is plain data and `Clone`: the scheduler checkpoints
//! it before each job attempt and restores the checkpoint on failure, which
//! is what gives job handlers transactional semantics over in-process state.
//!
//! Only the job tables are durable (see [`snapshot`]); the lineage graph is
//! rebuilt from forge events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::cascade::UpdateRequest;
use crate::port::PortRequest;
use crate::queue::job::{JobEnvelope, JobTable};
use crate::retire::RetireRequest;
use crate::types::{Batch, BatchId, Branch, BranchName, JobId, PrId, PullRequest};

pub mod lineage;
pub mod lock;
pub mod snapshot;

pub use lock::{LockTable, PrLock};

/// In-memory engine state.
#[derive(Debug, Clone, Default)]
pub struct Store {
    /// The project's release branch sequence, ordered by `sequence`.
    pub branches: Vec<Branch>,

    pub prs: BTreeMap<PrId, PullRequest>,
    pub batches: BTreeMap<BatchId, Batch>,

    pub port_jobs: JobTable<PortRequest>,
    pub update_jobs: JobTable<UpdateRequest>,
    pub retire_jobs: JobTable<RetireRequest>,

    pub next_pr_id: u64,
    pub next_batch_id: u64,
    pub next_job_id: u64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Id allocation ───

    pub fn alloc_pr_id(&mut self) -> PrId {
        self.next_pr_id += 1;
        PrId(self.next_pr_id)
    }

    pub fn alloc_batch_id(&mut self) -> BatchId {
        self.next_batch_id += 1;
        BatchId(self.next_batch_id)
    }

    pub fn alloc_job_id(&mut self) -> JobId {
        self.next_job_id += 1;
        JobId(self.next_job_id)
    }

    // ─── Branch sequence ───

    /// Appends a branch at the end of the sequence (newest).
    pub fn add_branch(&mut self, name: impl Into<BranchName>) -> &Branch {
        let sequence = self.branches.len() as u32;
        self.branches.push(Branch::new(name, sequence));
        self.branches.last().expect("just pushed")
    }

    /// Inserts a branch immediately after `after`, renumbering the sequence.
    /// Returns false if `after` is unknown or the name already exists.
    pub fn insert_branch_after(
        &mut self,
        after: &BranchName,
        name: impl Into<BranchName>,
    ) -> bool {
        let name = name.into();
        if self.branch(&name).is_some() {
            return false;
        }
        let Some(idx) = self.branches.iter().position(|b| &b.name == after) else {
            return false;
        };
        self.branches.insert(idx + 1, Branch::new(name, 0));
        for (i, branch) in self.branches.iter_mut().enumerate() {
            branch.sequence = i as u32;
        }
        true
    }

    pub fn branch(&self, name: &BranchName) -> Option<&Branch> {
        self.branches.iter().find(|b| &b.name == name)
    }

    pub fn branch_sequence(&self, name: &BranchName) -> Option<u32> {
        self.branch(name).map(|b| b.sequence)
    }

    /// The next active branch in forward-port order, if any.
    pub fn next_branch_after(&self, name: &BranchName) -> Option<&Branch> {
        let seq = self.branch_sequence(name)?;
        self.branches
            .iter()
            .filter(|b| b.active && b.sequence > seq)
            .min_by_key(|b| b.sequence)
    }

    // ─── PRs and batches ───

    pub fn pr(&self, id: PrId) -> Option<&PullRequest> {
        self.prs.get(&id)
    }

    pub fn pr_mut(&mut self, id: PrId) -> Option<&mut PullRequest> {
        self.prs.get_mut(&id)
    }

    pub fn insert_pr(&mut self, pr: PullRequest) {
        self.prs.insert(pr.id, pr);
    }

    pub fn batch(&self, id: BatchId) -> Option<&Batch> {
        self.batches.get(&id)
    }

    pub fn batch_mut(&mut self, id: BatchId) -> Option<&mut Batch> {
        self.batches.get_mut(&id)
    }

    pub fn insert_batch(&mut self, batch: Batch) {
        self.batches.insert(batch.id, batch);
    }

    /// Direct children of a batch, ordered by target branch sequence.
    pub fn batch_children(&self, id: BatchId) -> Vec<BatchId> {
        let mut children: Vec<&Batch> = self
            .batches
            .values()
            .filter(|b| b.parent_id == Some(id))
            .collect();
        children.sort_by_key(|b| (self.branch_sequence(&b.target), b.id));
        children.iter().map(|b| b.id).collect()
    }

    /// All batches whose parent chain leads back to `id`, in walking order
    /// (depth-first, children by target sequence). For a healthy chain this
    /// is a straight line, oldest port first.
    pub fn batch_descendants(&self, id: BatchId) -> Vec<BatchId> {
        let mut out = Vec::new();
        let mut stack = self.batch_children(id);
        stack.reverse();
        while let Some(b) = stack.pop() {
            out.push(b);
            let mut children = self.batch_children(b);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    // ─── Job enqueueing ───

    pub fn enqueue_port(&mut self, payload: PortRequest, now: DateTime<Utc>) -> JobId {
        let id = self.alloc_job_id();
        self.port_jobs.enqueue(JobEnvelope::new(id, payload, now));
        id
    }

    /// Upserts an update-cascade job, deduplicated on `new_root`: if a queued
    /// job already re-propagates from the same PR, no second row is created.
    pub fn enqueue_update(
        &mut self,
        payload: UpdateRequest,
        now: DateTime<Utc>,
    ) -> Option<JobId> {
        if self
            .update_jobs
            .iter()
            .any(|j| j.payload.new_root == payload.new_root)
        {
            return None;
        }
        let id = self.alloc_job_id();
        self.update_jobs.enqueue(JobEnvelope::new(id, payload, now));
        Some(id)
    }

    /// Enqueues a retirement job, deferred until `not_before`.
    pub fn enqueue_retire(
        &mut self,
        payload: RetireRequest,
        now: DateTime<Utc>,
        not_before: DateTime<Utc>,
    ) -> JobId {
        let id = self.alloc_job_id();
        let mut env = JobEnvelope::new(id, payload, now);
        env.retry_after = not_before;
        self.retire_jobs.enqueue(env);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{seed_chain_pr, seed_store};
    use crate::types::PrState;

    #[test]
    fn next_branch_after_skips_inactive() {
        let mut store = Store::new();
        store.add_branch("a");
        store.add_branch("b");
        store.add_branch("c");
        store.branches[1].active = false;

        let next = store.next_branch_after(&BranchName::new("a")).unwrap();
        assert_eq!(next.name, BranchName::new("c"));
        assert!(store.next_branch_after(&BranchName::new("c")).is_none());
    }

    #[test]
    fn insert_branch_after_renumbers() {
        let mut store = Store::new();
        store.add_branch("a");
        store.add_branch("c");
        assert!(store.insert_branch_after(&BranchName::new("a"), "b"));

        let names: Vec<_> = store.branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        let seqs: Vec<_> = store.branches.iter().map(|b| b.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        assert!(!store.insert_branch_after(&BranchName::new("a"), "b"));
        assert!(!store.insert_branch_after(&BranchName::new("zzz"), "d"));
    }

    #[test]
    fn batch_descendants_walk_in_target_order() {
        let (mut store, root_pr, root_batch) = seed_store();
        let (_, b1) = seed_chain_pr(&mut store, root_pr, root_batch, "b", PrState::Opened);
        let p1 = store.batch(b1).unwrap().prs[0];
        let (_, b2) = seed_chain_pr(&mut store, p1, b1, "c", PrState::Opened);

        assert_eq!(store.batch_descendants(root_batch), vec![b1, b2]);
        assert_eq!(store.batch_descendants(b2), Vec::<BatchId>::new());
    }

    #[test]
    fn enqueue_update_dedupes_on_new_root() {
        let mut store = Store::new();
        let now = Utc::now();
        let req = UpdateRequest {
            original_root: PrId(1),
            new_root: PrId(2),
        };
        assert!(store.enqueue_update(req.clone(), now).is_some());
        assert!(store.enqueue_update(req, now).is_none());
        assert_eq!(store.update_jobs.len(), 1);

        // A different changed PR still gets its own row.
        let other = UpdateRequest {
            original_root: PrId(1),
            new_root: PrId(3),
        };
        assert!(store.enqueue_update(other, now).is_some());
        assert_eq!(store.update_jobs.len(), 2);
    }

    proptest::proptest! {
        #[test]
        fn branch_sequence_stays_dense_under_insertion(
            names in proptest::collection::vec(crate::test_utils::arb_branch_name(), 1..8),
            inserts in proptest::collection::vec(
                (crate::test_utils::arb_branch_name(), 0usize..8),
                0..4,
            ),
        ) {
            let mut store = Store::new();
            for name in &names {
                if store.branch(name).is_none() {
                    store.add_branch(name.as_str());
                }
            }
            for (name, after_idx) in inserts {
                let after = store.branches[after_idx % store.branches.len()].name.clone();
                store.insert_branch_after(&after, name.as_str());
            }
            for (i, branch) in store.branches.iter().enumerate() {
                proptest::prop_assert_eq!(branch.sequence as usize, i);
            }
        }
    }
}
