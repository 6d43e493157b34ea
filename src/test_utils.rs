//! Shared test fixtures: seeded stores, scripted gateway mocks, and
//! proptest generators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use proptest::prelude::*;

use crate::gateway::{
    ForgeGateway, GatewayError, NewPullRequest, PortOutcome, RefPush, RefPushOutcome,
    RefPushResult, VcsGateway,
};
use crate::store::Store;
use crate::types::{
    Batch, BatchId, BranchName, ConflictReport, PrId, PrState, PullRequest, RepoId, Sha,
};

/// A fixed-width fake commit id.
pub fn make_sha(n: u64) -> Sha {
    Sha::new(format!("{n:040x}"))
}

/// A store with branches `a, b, c` and one tracked root PR targeting `a`,
/// in a singleton batch. Returns the store, the PR, and its batch.
pub fn seed_store() -> (Store, PrId, BatchId) {
    let mut store = Store::new();
    store.add_branch("a");
    store.add_branch("b");
    store.add_branch("c");

    let batch_id = store.alloc_batch_id();
    store.insert_batch(Batch::new(batch_id, "a", None));

    let pr_id = store.alloc_pr_id();
    store.insert_pr(PullRequest {
        id: pr_id,
        repo: RepoId::new("owner", "project"),
        number: 100,
        target: BranchName::new("a"),
        head: make_sha(pr_id.0),
        head_ref: BranchName::new("change-1"),
        label: "forwardport-bot:change-1".to_string(),
        state: PrState::Opened,
        reviewed_by: None,
        source_id: pr_id,
        parent_id: None,
        batch_id,
        conflict: None,
        closed_at: None,
    });
    store.batch_mut(batch_id).unwrap().prs.push(pr_id);

    (store, pr_id, batch_id)
}

/// Extends a chain by one hop: a child batch targeting `target` holding one
/// port of `parent_pr`. Returns the new PR and its batch.
pub fn seed_chain_pr(
    store: &mut Store,
    parent_pr: PrId,
    parent_batch: BatchId,
    target: &str,
    state: PrState,
) -> (PrId, BatchId) {
    let parent = store.pr(parent_pr).expect("parent PR must be seeded").clone();

    let batch_id = store.alloc_batch_id();
    store.insert_batch(Batch::new(batch_id, target, Some(parent_batch)));

    let pr_id = store.alloc_pr_id();
    let head_ref = BranchName::new(format!("fw-{target}-{}", parent.source_id.0));
    store.insert_pr(PullRequest {
        id: pr_id,
        repo: parent.repo.clone(),
        number: 100 + pr_id.0,
        target: BranchName::new(target),
        head: make_sha(pr_id.0),
        head_ref: head_ref.clone(),
        label: format!("forwardport-bot:{head_ref}"),
        state,
        reviewed_by: None,
        source_id: parent.source_id,
        parent_id: Some(parent_pr),
        batch_id,
        conflict: None,
        closed_at: None,
    });
    store.batch_mut(batch_id).unwrap().prs.push(pr_id);

    (pr_id, batch_id)
}

// ─── Gateway mocks ───

/// Scripted in-memory [`VcsGateway`].
#[derive(Debug, Default)]
pub struct MockVcs {
    conflicts: Mutex<HashMap<(Sha, BranchName), ConflictReport>>,
    rejected_refs: Mutex<HashSet<BranchName>>,
    empty_range: AtomicBool,
    pushes: Mutex<Vec<(RepoId, Vec<RefPush>)>>,
    fetches: Mutex<Vec<(RepoId, Vec<String>)>>,
    head_counter: AtomicU64,
}

impl MockVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create_port_branch(source, .., target)` report this conflict.
    pub fn script_conflict(&self, source: Sha, target: BranchName, report: ConflictReport) {
        self.conflicts
            .lock()
            .unwrap()
            .insert((source, target), report);
    }

    /// Makes every push touching this ref fail its lease check.
    pub fn reject_ref(&self, branch: BranchName) {
        self.rejected_refs.lock().unwrap().insert(branch);
    }

    /// Makes every `rev_list_count` report zero commits.
    pub fn script_empty_range(&self) {
        self.empty_range.store(true, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> Vec<(RepoId, Vec<RefPush>)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<(RepoId, Vec<String>)> {
        self.fetches.lock().unwrap().clone()
    }
}

impl VcsGateway for MockVcs {
    async fn fetch(&self, repo: &RepoId, refspecs: &[String]) -> Result<(), GatewayError> {
        self.fetches
            .lock()
            .unwrap()
            .push((repo.clone(), refspecs.to_vec()));
        Ok(())
    }

    async fn push(
        &self,
        repo: &RepoId,
        edits: &[RefPush],
    ) -> Result<Vec<RefPushResult>, GatewayError> {
        self.pushes
            .lock()
            .unwrap()
            .push((repo.clone(), edits.to_vec()));
        let rejected = self.rejected_refs.lock().unwrap();
        Ok(edits
            .iter()
            .map(|e| RefPushResult {
                branch: e.branch.clone(),
                outcome: if rejected.contains(&e.branch) {
                    RefPushOutcome::LeaseRejected { actual: None }
                } else {
                    RefPushOutcome::Applied
                },
            })
            .collect())
    }

    async fn create_port_branch(
        &self,
        _repo: &RepoId,
        source: &Sha,
        target: &BranchName,
    ) -> Result<PortOutcome, GatewayError> {
        let conflict = self
            .conflicts
            .lock()
            .unwrap()
            .get(&(source.clone(), target.clone()))
            .cloned();
        let n = self.head_counter.fetch_add(1, Ordering::SeqCst);
        Ok(PortOutcome {
            new_head: make_sha(0xA000_0000 + n),
            conflict,
        })
    }

    async fn rev_list_count(&self, _repo: &RepoId, _range: &str) -> Result<u64, GatewayError> {
        if self.empty_range.load(Ordering::SeqCst) {
            Ok(0)
        } else {
            Ok(1)
        }
    }
}

/// Scripted in-memory [`ForgeGateway`].
#[derive(Debug, Default)]
pub struct MockForge {
    comments: Mutex<Vec<(RepoId, u64, String)>>,
    labels: Mutex<Vec<(RepoId, u64, Vec<String>)>>,
    deleted: Mutex<Vec<(RepoId, BranchName)>>,
    fail_pr_creation: AtomicBool,
    next_number: AtomicU64,
}

impl MockForge {
    pub fn new() -> Self {
        MockForge {
            next_number: AtomicU64::new(500),
            ..Default::default()
        }
    }

    pub fn fail_pr_creation(&self, fail: bool) {
        self.fail_pr_creation.store(fail, Ordering::SeqCst);
    }

    pub fn comments(&self) -> Vec<(RepoId, u64, String)> {
        self.comments.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<(RepoId, u64, Vec<String>)> {
        self.labels.lock().unwrap().clone()
    }

    pub fn deleted_branches(&self) -> Vec<(RepoId, BranchName)> {
        self.deleted.lock().unwrap().clone()
    }
}

impl ForgeGateway for MockForge {
    async fn create_pull_request(
        &self,
        _repo: &RepoId,
        _spec: &NewPullRequest,
    ) -> Result<u64, GatewayError> {
        if self.fail_pr_creation.load(Ordering::SeqCst) {
            return Err(GatewayError::permanent("scripted PR creation failure"));
        }
        Ok(self.next_number.fetch_add(1, Ordering::SeqCst))
    }

    async fn delete_branch(&self, repo: &RepoId, branch: &BranchName) -> Result<(), GatewayError> {
        self.deleted
            .lock()
            .unwrap()
            .push((repo.clone(), branch.clone()));
        Ok(())
    }

    async fn add_labels(
        &self,
        repo: &RepoId,
        number: u64,
        labels: &[String],
    ) -> Result<(), GatewayError> {
        self.labels
            .lock()
            .unwrap()
            .push((repo.clone(), number, labels.to_vec()));
        Ok(())
    }

    async fn post_comment(
        &self,
        repo: &RepoId,
        number: u64,
        body: &str,
    ) -> Result<(), GatewayError> {
        self.comments
            .lock()
            .unwrap()
            .push((repo.clone(), number, body.to_string()));
        Ok(())
    }
}

// ─── Proptest generators ───

pub fn arb_sha() -> impl Strategy<Value = Sha> {
    "[0-9a-f]{40}".prop_map(Sha::new)
}

pub fn arb_branch_name() -> impl Strategy<Value = BranchName> {
    "[a-z][a-z0-9/-]{0,30}".prop_map(BranchName::new)
}
