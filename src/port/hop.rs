//! The single-hop primitive: reproduce one PR onto the next branch.
//!
//! Everything here is ordered so that a retryable failure cannot leave a
//! half-created port behind:
//! 1. Build the port commit locally (no remote writes).
//! 2. Push the port branch with a must-not-exist precondition. A lease
//!    rejection means a concurrent or earlier attempt got there first.
//! 3. Open the PR. If this fails, the pushed branch is deleted again so the
//!    hop stays retryable by a fresh triggering event.
//!
//! After the PR exists, the remaining steps (labels, notices) are
//! best-effort only; failing the job at that point would duplicate the PR
//! on retry.

use crate::gateway::{ForgeGateway, NewPullRequest, RefPush, VcsGateway};
use crate::notify;
use crate::queue::{JobContext, JobError};
use crate::store::Store;
use crate::types::{BatchId, BranchName, PrId, PrState, PullRequest};

/// Deterministic port branch name for a chain at a target branch. Retried
/// attempts regenerate the same name, so the must-not-exist push precondition
/// doubles as a duplicate guard.
pub(super) fn port_branch_name(target: &BranchName, source: PrId) -> BranchName {
    BranchName::new(format!("fw-{target}-{}", source.0))
}

/// Ports `src_id` one hop onto `target`, appending the new PR to
/// `new_batch`. Returns the id of the created PR, or `None` when the target
/// already contains the change (nothing to port).
pub(super) async fn port_pr_one_hop<V: VcsGateway, F: ForgeGateway>(
    store: &mut Store,
    ctx: &JobContext<'_, V, F>,
    src_id: PrId,
    target: &BranchName,
    new_batch: BatchId,
) -> Result<Option<PrId>, JobError> {
    let src = store
        .pr(src_id)
        .cloned()
        .ok_or_else(|| JobError::Hard(format!("source PR {src_id} is not tracked")))?;

    let outcome = ctx
        .vcs
        .create_port_branch(&src.repo, &src.head, target)
        .await?;

    // A clean pick that adds no commits over the target means the change
    // already landed there (e.g. it was cherry-picked by hand); opening an
    // empty PR would only confuse people.
    if outcome.conflict.is_none() {
        let ahead = ctx
            .vcs
            .rev_list_count(&src.repo, &format!("{target}..{}", outcome.new_head))
            .await?;
        if ahead == 0 {
            tracing::info!(repo = %src.repo, source = %src_id, target = %target,
                "target already contains the change, skipping port");
            notify::post(
                ctx.forge,
                &src.repo,
                src.number,
                &notify::nothing_to_port_notice(target),
            )
            .await;
            return Ok(None);
        }
    }

    let new_ref = port_branch_name(target, src.source_id);
    let results = ctx
        .vcs
        .push(
            &src.repo,
            &[RefPush::create(new_ref.clone(), outcome.new_head.clone())],
        )
        .await?;
    if results.iter().any(|r| !r.outcome.is_applied()) {
        return Err(JobError::Transient(format!(
            "port branch {new_ref} already exists on the remote"
        )));
    }

    let spec = NewPullRequest {
        base: target.clone(),
        head: format!("{}:{new_ref}", ctx.config.fp_owner),
        title: format!("Forward port of #{} to {target}", src.number),
        body: format!(
            "Forward port of {}#{} onto `{target}`.",
            src.repo, src.number
        ),
    };
    let number = match ctx.forge.create_pull_request(&src.repo, &spec).await {
        Ok(number) => number,
        Err(e) => {
            // Undo the push so a later event can retry the hop cleanly.
            if let Err(del) = ctx.forge.delete_branch(&src.repo, &new_ref).await {
                tracing::warn!(repo = %src.repo, branch = %new_ref, error = %del,
                    "failed to clean up port branch after PR creation failure");
            }
            notify::post(
                ctx.forge,
                &src.repo,
                src.number,
                &notify::creation_failed_notice(target, &e.to_string()),
            )
            .await;
            return Err(JobError::Hard(format!(
                "could not open port PR onto {target}: {e}"
            )));
        }
    };

    let id = store.alloc_pr_id();
    let conflicted = outcome.conflict.is_some();
    store.insert_pr(PullRequest {
        id,
        repo: src.repo.clone(),
        number,
        target: target.clone(),
        head: outcome.new_head,
        head_ref: new_ref.clone(),
        label: format!("{}:{new_ref}", ctx.config.fp_owner),
        state: PrState::Opened,
        reviewed_by: None,
        source_id: src.source_id,
        // A conflicted port starts detached: its contents need human edits,
        // so ancestor updates must not overwrite them.
        parent_id: (!conflicted).then_some(src.id),
        batch_id: new_batch,
        conflict: outcome.conflict.clone(),
        closed_at: None,
    });
    if let Some(batch) = store.batch_mut(new_batch) {
        batch.prs.push(id);
    }

    let mut labels = vec![ctx.config.port_label.clone()];
    if conflicted {
        labels.push(ctx.config.conflict_label.clone());
    }
    if let Err(e) = ctx.forge.add_labels(&src.repo, number, &labels).await {
        tracing::warn!(repo = %src.repo, number, error = %e, "failed to label port PR");
    }

    if let Some(report) = &outcome.conflict {
        notify::post(
            ctx.forge,
            &src.repo,
            number,
            &notify::conflict_notice(target, report),
        )
        .await;
        notify::post(
            ctx.forge,
            &src.repo,
            src.number,
            &notify::predecessor_conflict_notice(target, number),
        )
        .await;
    }

    tracing::info!(repo = %src.repo, source = %src_id, port = %id, number,
        target = %target, conflicted, "ported PR one hop");
    Ok(Some(id))
}
