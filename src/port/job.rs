//! Forward-port job dispatch.

use crate::gateway::{ForgeGateway, VcsGateway};
use crate::queue::{JobContext, JobError, JobOutcome};
use crate::store::Store;
use crate::types::{Batch, BatchId, RepoId};

use super::{complete, hop, insert, PortKind, PortRequest};

pub async fn run<V: VcsGateway, F: ForgeGateway>(
    store: &mut Store,
    ctx: &JobContext<'_, V, F>,
    req: &PortRequest,
) -> Result<JobOutcome, JobError> {
    match req.kind {
        PortKind::FromMerge | PortKind::FollowUp => {
            if let Some(child) = port_forward(store, ctx, req.batch).await? {
                store.enqueue_port(
                    PortRequest {
                        batch: child,
                        kind: PortKind::FollowUp,
                        pr: None,
                    },
                    ctx.now,
                );
                tracing::info!(batch = %req.batch, child = %child,
                    "batch ported, follow-up hop enqueued");
            }
            Ok(JobOutcome::Done)
        }
        PortKind::InsertNewBranch => {
            // The chain past the inserted branch already exists; the splice
            // wires the new hop into it, so advancing further would duplicate
            // ports that are already open.
            if let Some(new_batch) = port_forward(store, ctx, req.batch).await? {
                insert::relink(store, req.batch, new_batch);
            }
            Ok(JobOutcome::Done)
        }
        PortKind::CompleteDescendants => {
            let pr = req.pr.ok_or_else(|| {
                JobError::Hard("catch-up job is missing the late-added PR".to_string())
            })?;
            complete::run(store, ctx, req.batch, pr).await
        }
    }
}

/// Ports every PR of `batch_id` onto the next active branch, creating a
/// child batch. Returns the child batch, or `None` when `batch_id` targets
/// the end of the sequence or every member was already on the target. The
/// caller decides whether the chain advances past the child.
pub(super) async fn port_forward<V: VcsGateway, F: ForgeGateway>(
    store: &mut Store,
    ctx: &JobContext<'_, V, F>,
    batch_id: BatchId,
) -> Result<Option<BatchId>, JobError> {
    let batch = store
        .batch(batch_id)
        .cloned()
        .ok_or_else(|| JobError::Hard(format!("batch {batch_id} is not tracked")))?;

    let Some(next) = store.next_branch_after(&batch.target) else {
        tracing::debug!(batch = %batch_id, target = %batch.target,
            "no later active branch, chain complete");
        return Ok(None);
    };
    let target = next.name.clone();

    // Make sure the source commits are present locally before building the
    // port commits.
    for repo in member_repos(store, &batch) {
        ctx.vcs
            .fetch(&repo, &["+refs/heads/*:refs/remotes/origin/*".to_string()])
            .await?;
    }

    let new_batch_id = store.alloc_batch_id();
    store.insert_batch(Batch::new(new_batch_id, target.clone(), Some(batch_id)));

    for pr in batch.prs {
        hop::port_pr_one_hop(store, ctx, pr, &target, new_batch_id).await?;
    }

    // Every member turned out to already be on the target: nothing was
    // ported, so there is no child batch to carry forward.
    if store
        .batch(new_batch_id)
        .is_some_and(|b| b.prs.is_empty())
    {
        store.batches.remove(&new_batch_id);
        tracing::info!(batch = %batch_id, target = %target, "nothing to port, chain stops here");
        return Ok(None);
    }

    Ok(Some(new_batch_id))
}

fn member_repos(store: &Store, batch: &Batch) -> Vec<RepoId> {
    let mut repos: Vec<RepoId> = Vec::new();
    for pr in batch.prs.iter().filter_map(|id| store.pr(*id)) {
        if !repos.contains(&pr.repo) {
            repos.push(pr.repo.clone());
        }
    }
    repos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::{lineage, LockTable};
    use crate::test_utils::{seed_chain_pr, seed_store, MockForge, MockVcs};
    use crate::types::{BranchName, PrState};
    use chrono::Utc;

    struct Fixture {
        vcs: MockVcs,
        forge: MockForge,
        locks: LockTable,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                vcs: MockVcs::new(),
                forge: MockForge::new(),
                locks: LockTable::new(),
                config: Config::default(),
            }
        }

        fn ctx(&self) -> JobContext<'_, MockVcs, MockForge> {
            JobContext {
                vcs: &self.vcs,
                forge: &self.forge,
                locks: &self.locks,
                config: &self.config,
                now: Utc::now(),
            }
        }
    }

    #[tokio::test]
    async fn from_merge_ports_one_hop_and_enqueues_follow_up() {
        let (mut store, src, batch) = seed_store();
        store.pr_mut(src).unwrap().state = PrState::Merged;
        let fx = Fixture::new();

        let req = PortRequest {
            batch,
            kind: PortKind::FromMerge,
            pr: None,
        };
        let outcome = run(&mut store, &fx.ctx(), &req).await.unwrap();
        assert_eq!(outcome, JobOutcome::Done);

        // One child batch targeting "b", holding one port of src.
        let children = store.batch_children(batch);
        assert_eq!(children.len(), 1);
        let child = store.batch(children[0]).unwrap();
        assert_eq!(child.target.as_str(), "b");
        assert_eq!(child.prs.len(), 1);
        assert_eq!(lineage::child_of(&store, src), Some(child.prs[0]));

        // The follow-up hop for the child batch is queued.
        let jobs: Vec<_> = store.port_jobs.iter().collect();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].payload.batch, children[0]);
        assert_eq!(jobs[0].payload.kind, PortKind::FollowUp);

        // The member repository was fetched before porting.
        assert_eq!(fx.vcs.fetches().len(), 1);
    }

    #[tokio::test]
    async fn follow_up_chain_runs_to_end_of_sequence() {
        let (mut store, src, batch) = seed_store();
        store.pr_mut(src).unwrap().state = PrState::Merged;
        let fx = Fixture::new();

        // Drain the port queue by hand: merge hop, then follow-ups.
        let mut req = PortRequest {
            batch,
            kind: PortKind::FromMerge,
            pr: None,
        };
        loop {
            run(&mut store, &fx.ctx(), &req).await.unwrap();
            let Some(next) = store.port_jobs.iter().next().map(|j| (j.id, j.payload.clone()))
            else {
                break;
            };
            store.port_jobs.remove(next.0);
            req = next.1;
        }

        // Branch sequence is a, b, c: the chain is two ports long.
        let chain = lineage::forward_chain(&store, src);
        let targets: Vec<_> = chain
            .iter()
            .map(|id| store.pr(*id).unwrap().target.as_str().to_string())
            .collect();
        assert_eq!(targets, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn inserted_branch_port_does_not_advance_past_the_splice() {
        let (mut store, root, root_batch) = seed_store();
        store.pr_mut(root).unwrap().state = PrState::Merged;

        // Chain built while the sequence was a, c: the root already has an
        // open port at c.
        store.branches.remove(1);
        for (i, b) in store.branches.iter_mut().enumerate() {
            b.sequence = i as u32;
        }
        let (c_pr, _) = seed_chain_pr(&mut store, root, root_batch, "c", PrState::Opened);

        // The new branch arrives between a and c.
        assert!(store.insert_branch_after(&BranchName::new("a"), "b"));
        let fx = Fixture::new();

        let req = PortRequest {
            batch: root_batch,
            kind: PortKind::InsertNewBranch,
            pr: None,
        };
        assert_eq!(
            run(&mut store, &fx.ctx(), &req).await.unwrap(),
            JobOutcome::Done
        );

        // One new hop at b, spliced in front of the existing c port; no
        // follow-up job that would re-port the lineage onto c.
        assert!(store.port_jobs.is_empty());
        let chain = lineage::forward_chain(&store, root);
        assert_eq!(chain.len(), 2);
        assert_eq!(store.pr(chain[0]).unwrap().target.as_str(), "b");
        assert_eq!(chain[1], c_pr);

        let source_id = store.pr(root).unwrap().source_id;
        let at_c: Vec<_> = store
            .prs
            .values()
            .filter(|p| p.source_id == source_id && p.target.as_str() == "c")
            .collect();
        assert_eq!(at_c.len(), 1);
    }

    #[tokio::test]
    async fn last_branch_batch_is_a_no_op() {
        let (mut store, src, _) = seed_store();
        let fx = Fixture::new();

        // Put the PR's batch at the end of the sequence.
        let last = store.alloc_batch_id();
        store.insert_batch(Batch::new(last, "c", None));
        store.batch_mut(last).unwrap().prs.push(src);
        store.pr_mut(src).unwrap().batch_id = last;
        store.pr_mut(src).unwrap().target = crate::types::BranchName::new("c");

        let req = PortRequest {
            batch: last,
            kind: PortKind::FromMerge,
            pr: None,
        };
        assert_eq!(
            run(&mut store, &fx.ctx(), &req).await.unwrap(),
            JobOutcome::Done
        );
        assert!(store.port_jobs.is_empty());
        assert_eq!(store.batch_children(last), Vec::<BatchId>::new());
    }

    #[tokio::test]
    async fn unknown_batch_is_hard() {
        let (mut store, _, _) = seed_store();
        let fx = Fixture::new();
        let req = PortRequest {
            batch: BatchId(999),
            kind: PortKind::FollowUp,
            pr: None,
        };
        assert!(matches!(
            run(&mut store, &fx.ctx(), &req).await,
            Err(JobError::Hard(_))
        ));
    }
}
