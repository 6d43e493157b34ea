//! The update-cascade job.

use std::collections::BTreeMap;

use crate::gateway::{ForgeGateway, RefPush, RefPushOutcome, VcsGateway};
use crate::notify;
use crate::queue::{JobContext, JobError, JobOutcome};
use crate::store::{lineage, Store};
use crate::types::{PrId, RepoId};

use super::UpdateRequest;

pub async fn run<V: VcsGateway, F: ForgeGateway>(
    store: &mut Store,
    ctx: &JobContext<'_, V, F>,
    req: &UpdateRequest,
) -> Result<JobOutcome, JobError> {
    // The amended PR may have been closed and forgotten since the event was
    // queued; there is nothing left to propagate.
    let Some(changed) = store.pr(req.new_root) else {
        tracing::debug!(pr = %req.new_root, "amended PR no longer tracked, dropping cascade");
        return Ok(JobOutcome::Done);
    };
    let batch_id = changed.batch_id;
    let Some(batch) = store.batch(batch_id).cloned() else {
        return Ok(JobOutcome::Done);
    };

    // The whole batch moves in lockstep: every member's chain is rewritten
    // level by level, so sibling ports never end up mixing old and new
    // ancestor states.
    let roots: Vec<PrId> = batch.prs.clone();
    let chains: Vec<Vec<PrId>> = roots
        .iter()
        .map(|r| lineage::forward_chain(store, *r))
        .collect();
    let depth = chains.iter().map(|c| c.len()).max().unwrap_or(0);
    if depth == 0 {
        return Ok(JobOutcome::Done);
    }

    // Locks are taken non-blocking as the walk descends and held until the
    // buffered pushes are flushed. Contention means another cascade is
    // touching the same chain; retry later.
    let mut guards = Vec::new();
    // Ref rewrites are buffered and flushed at the end (or at a halt), so a
    // retryable failure mid-walk leaves the remote untouched.
    let mut pending: BTreeMap<RepoId, Vec<RefPush>> = BTreeMap::new();

    let mut preds: Vec<PrId> = roots.clone();
    for level in 0..depth {
        let pairs: Vec<(usize, PrId)> = chains
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.get(level).map(|d| (i, *d)))
            .collect();
        if pairs.is_empty() {
            break;
        }

        if let Some(&(blocked_idx, finished)) = pairs
            .iter()
            .find(|(_, d)| store.prs[d].state.is_finished())
        {
            halt_notices(store, ctx, &pairs, preds[blocked_idx], finished).await;
            break;
        }

        for (_, d) in &pairs {
            match ctx.locks.try_lock(*d) {
                Some(guard) => guards.push(guard),
                None => {
                    return Err(JobError::Transient(format!(
                        "descendant {d} is locked by another cascade"
                    )));
                }
            }
        }

        for (i, d) in pairs {
            let (repo, target, head_ref, old_head) = {
                let desc = &store.prs[&d];
                (
                    desc.repo.clone(),
                    desc.target.clone(),
                    desc.head_ref.clone(),
                    desc.head.clone(),
                )
            };
            let pred_head = store.prs[&preds[i]].head.clone();

            let outcome = ctx.vcs.create_port_branch(&repo, &pred_head, &target).await?;
            if let Some(report) = &outcome.conflict {
                let number = store.prs[&d].number;
                notify::post(ctx.forge, &repo, number, &notify::conflict_notice(&target, report))
                    .await;
            }

            pending
                .entry(repo)
                .or_default()
                .push(RefPush::update(head_ref, outcome.new_head.clone(), old_head));
            if let Some(desc) = store.pr_mut(d) {
                desc.head = outcome.new_head;
                desc.conflict = outcome.conflict;
            }
            preds[i] = d;
        }
    }

    flush(ctx, &pending).await?;
    tracing::info!(pr = %req.new_root, levels = depth, "update cascade finished");
    Ok(JobOutcome::Done)
}

/// Tells the humans why propagation stopped: every descendant at the halted
/// level gets exactly one notice (the finished PR included, since it is the
/// one whose state blocked the rewrite), and so does the predecessor of the
/// finished PR.
async fn halt_notices<V: VcsGateway, F: ForgeGateway>(
    store: &Store,
    ctx: &JobContext<'_, V, F>,
    pairs: &[(usize, PrId)],
    blocked_pred: PrId,
    finished: PrId,
) {
    let finished_number = store.prs[&finished].number;
    for (_, d) in pairs {
        let desc = &store.prs[d];
        let body = if *d == finished {
            notify::cascade_finished_pr_notice()
        } else {
            notify::cascade_halted_notice(finished_number)
        };
        notify::post(ctx.forge, &desc.repo, desc.number, &body).await;
    }
    let pred = &store.prs[&blocked_pred];
    notify::post(
        ctx.forge,
        &pred.repo,
        pred.number,
        &notify::cascade_blocked_notice(finished_number),
    )
    .await;
    tracing::warn!(finished = %finished, "update cascade halted at a finished PR");
}

async fn flush<V: VcsGateway, F: ForgeGateway>(
    ctx: &JobContext<'_, V, F>,
    pending: &BTreeMap<RepoId, Vec<RefPush>>,
) -> Result<(), JobError> {
    for (repo, edits) in pending {
        let results = ctx.vcs.push(repo, edits).await?;
        for r in results {
            if let RefPushOutcome::LeaseRejected { actual } = r.outcome {
                // Someone pushed to the head branch after we read it; the
                // head-change event for that push will queue a fresh cascade.
                tracing::warn!(repo = %repo, branch = %r.branch, ?actual,
                    "cascade push lost the lease race, skipping ref");
            }
        }
    }
    Ok(())
}
