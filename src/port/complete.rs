//! Catching a late-added PR up with its batch's descendants.
//!
//! When a PR joins a batch whose siblings already ported onward, the
//! descendant batches exist but are missing this PR's lineage. This job
//! walks the descendant chain in port order and creates the missing port at
//! each level, joining the existing batch rather than opening a new one.
//!
//! The walk stops cleanly (not an error) when the lineage already has an
//! open PR at the next level, which makes re-running the job idempotent. It
//! aborts when the recorded descendant chain disagrees with the branch
//! sequence, since porting into the wrong batch would corrupt the chain.

use crate::gateway::{ForgeGateway, VcsGateway};
use crate::notify;
use crate::queue::{JobContext, JobError, JobOutcome};
use crate::store::{lineage, Store};
use crate::types::{BatchId, PrId};

use super::hop;

pub(super) async fn run<V: VcsGateway, F: ForgeGateway>(
    store: &mut Store,
    ctx: &JobContext<'_, V, F>,
    batch_id: BatchId,
    pr_id: PrId,
) -> Result<JobOutcome, JobError> {
    let mut latest = pr_id;

    for desc in store.batch_descendants(batch_id) {
        let (cur_target, source_id, repo, number) = {
            let pr = store
                .pr(latest)
                .ok_or_else(|| JobError::Hard(format!("PR {latest} is not tracked")))?;
            (
                pr.target.clone(),
                pr.source_id,
                pr.repo.clone(),
                pr.number,
            )
        };

        let Some(expected) = store.next_branch_after(&cur_target).map(|b| b.name.clone())
        else {
            break;
        };

        // Already caught up at this level (e.g. a previous run got this
        // far). Checked before the consistency gate so a fully ported chain
        // stops quietly even when the batch records have gone stale.
        if lineage::open_pr_at(store, source_id, &expected).is_some() {
            break;
        }

        let desc_target = store
            .batch(desc)
            .map(|b| b.target.clone())
            .ok_or_else(|| JobError::Hard(format!("batch {desc} is not tracked")))?;
        if desc_target != expected {
            notify::post(
                ctx.forge,
                &repo,
                number,
                &notify::sequence_inconsistency_notice(&expected, &desc_target),
            )
            .await;
            return Err(JobError::Hard(format!(
                "descendant batch {desc} targets {desc_target}, expected {expected}"
            )));
        }

        match hop::port_pr_one_hop(store, ctx, latest, &desc_target, desc).await? {
            Some(created) => latest = created,
            // Already on the target; deeper levels descend from it too.
            None => break,
        }
    }

    Ok(JobOutcome::Done)
}
