//! Head-branch retirement.
//!
//! Once a PR has been merged or closed for long enough, its bot-owned head
//! branch is deleted from the fork. Two guards apply:
//!
//! - An age gate: the branch survives for a grace period after the PR
//!   finishes, so late reverts and discussions still have the commits.
//! - An ownership gate: the branch is only deleted when the PR's recorded
//!   head label names the bot's fork owner. Anything else is someone's own
//!   branch and is refused loudly.
//!
//! Deletion is a compare-and-swap push: it only goes through while the
//! remote ref still points at the PR's last known head.

use serde::{Deserialize, Serialize};

use crate::gateway::{ForgeGateway, RefPush, VcsGateway};
use crate::notify;
use crate::queue::{JobContext, JobError, JobOutcome};
use crate::store::Store;
use crate::types::PrId;

/// Payload of a retirement job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetireRequest {
    pub pr: PrId,
}

pub async fn run<V: VcsGateway, F: ForgeGateway>(
    store: &mut Store,
    ctx: &JobContext<'_, V, F>,
    req: &RetireRequest,
) -> Result<JobOutcome, JobError> {
    let Some(pr) = store.pr(req.pr).cloned() else {
        return Ok(JobOutcome::Done);
    };
    // Reopened since the job was queued; a later finish event will queue a
    // fresh one.
    if !pr.state.is_finished() {
        return Ok(JobOutcome::Done);
    }

    let Some(closed_at) = pr.closed_at else {
        tracing::warn!(pr = %pr.id, "finished PR has no close timestamp, skipping retirement");
        return Ok(JobOutcome::Done);
    };
    let eligible_at = closed_at + ctx.config.merge_age();
    if ctx.now < eligible_at {
        return Ok(JobOutcome::Reschedule(eligible_at));
    }

    match pr.label_owner() {
        Some(owner) if owner == ctx.config.fp_owner => {}
        owner => {
            let owner = owner.unwrap_or("<unknown>");
            notify::post(
                ctx.forge,
                &pr.repo,
                pr.number,
                &notify::ownership_refusal_notice(owner, &pr.head_ref),
            )
            .await;
            return Err(JobError::Hard(format!(
                "head branch {} of {} belongs to {owner}, refusing to delete",
                pr.head_ref, pr.id
            )));
        }
    }

    let results = ctx
        .vcs
        .push(
            &pr.repo,
            &[RefPush::delete(pr.head_ref.clone(), pr.head.clone())],
        )
        .await?;
    if results.iter().any(|r| !r.outcome.is_applied()) {
        // The ref moved after the PR finished; re-read on retry.
        return Err(JobError::Transient(format!(
            "head branch {} moved since the PR finished",
            pr.head_ref
        )));
    }

    tracing::info!(pr = %pr.id, branch = %pr.head_ref, "retired head branch");
    Ok(JobOutcome::Done)
}
