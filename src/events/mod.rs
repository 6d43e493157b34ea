//! Engine events and the ingest step that turns them into queued jobs.
//!
//! Events arrive from the webhook server (or a replay tool) already
//! translated out of forge-specific payloads. Ingesting an event only
//! mutates bookkeeping and enqueues jobs; all side effects happen later in
//! the scheduler, so ingest is cheap and never fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cascade::UpdateRequest;
use crate::config::Config;
use crate::port::{PortKind, PortRequest};
use crate::retire::RetireRequest;
use crate::store::Store;
use crate::types::{BatchId, BranchName, PrId, Sha};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A batch merged into its target branch: start forward porting.
    BatchMerged { batch: BatchId },

    /// A tracked PR's head moved (the author amended it): detach it from
    /// its ancestors and re-propagate its new contents downstream.
    PrHeadChanged { pr: PrId, new_head: Sha },

    /// A tracked PR was merged or closed: schedule head-branch retirement.
    PrFinished {
        pr: PrId,
        merged: bool,
        at: DateTime<Utc>,
    },

    /// A PR joined a batch that may already have ported onward: catch it
    /// up through the existing descendants.
    PrAddedToBatch { batch: BatchId, pr: PrId },

    /// A release branch was inserted into the sequence after `after`:
    /// splice ports of the adjacent batches across it.
    BranchAdded { name: BranchName, after: BranchName },
}

/// Applies one event to the store.
pub fn ingest(store: &mut Store, config: &Config, now: DateTime<Utc>, event: EngineEvent) {
    match event {
        EngineEvent::BatchMerged { batch } => {
            if store.batch(batch).is_none() {
                tracing::warn!(%batch, "merge event for unknown batch, ignoring");
                return;
            }
            let job = store.enqueue_port(
                PortRequest {
                    batch,
                    kind: PortKind::FromMerge,
                    pr: None,
                },
                now,
            );
            tracing::info!(%batch, %job, "batch merged, forward port queued");
        }

        EngineEvent::PrHeadChanged { pr, new_head } => {
            let Some(row) = store.pr_mut(pr) else {
                tracing::debug!(%pr, "head change for untracked PR, ignoring");
                return;
            };
            row.head = new_head;
            // An amended port no longer reproduces its parent; it roots its
            // own sub-lineage from here on.
            if row.parent_id.is_some() {
                row.detach();
                tracing::info!(%pr, "PR amended, detached from its predecessor");
            }
            let source_id = row.source_id;
            if let Some(job) = store.enqueue_update(
                UpdateRequest {
                    original_root: source_id,
                    new_root: pr,
                },
                now,
            ) {
                tracing::info!(%pr, %job, "update cascade queued");
            }
        }

        EngineEvent::PrFinished { pr, merged, at } => {
            let Some(row) = store.pr_mut(pr) else {
                tracing::debug!(%pr, "finish event for untracked PR, ignoring");
                return;
            };
            row.state = if merged {
                crate::types::PrState::Merged
            } else {
                crate::types::PrState::Closed
            };
            row.closed_at = Some(at);
            store.enqueue_retire(RetireRequest { pr }, now, at + config.merge_age());
        }

        EngineEvent::PrAddedToBatch { batch, pr } => {
            if store.batch(batch).is_none() || store.pr(pr).is_none() {
                tracing::warn!(%batch, %pr, "membership event with unknown ids, ignoring");
                return;
            }
            store.enqueue_port(
                PortRequest {
                    batch,
                    kind: PortKind::CompleteDescendants,
                    pr: Some(pr),
                },
                now,
            );
        }

        EngineEvent::BranchAdded { name, after } => {
            if !store.insert_branch_after(&after, name.clone()) {
                tracing::warn!(%name, %after, "could not insert branch, ignoring");
                return;
            }
            // Every chain that already crossed the insertion point needs the
            // new hop spliced in: port each batch sitting just before the new
            // branch.
            let to_port: Vec<BatchId> = store
                .batches
                .values()
                .filter(|b| b.target == after && !b.prs.is_empty())
                .filter(|b| !store.batch_children(b.id).is_empty())
                .map(|b| b.id)
                .collect();
            for batch in to_port {
                store.enqueue_port(
                    PortRequest {
                        batch,
                        kind: PortKind::InsertNewBranch,
                        pr: None,
                    },
                    now,
                );
            }
            tracing::info!(%name, %after, "branch inserted into the sequence");
        }
    }
}
