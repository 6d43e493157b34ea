//! Forward porting: reproducing merged work onto each later release branch.
//!
//! A port job operates on one batch and advances it exactly one branch in
//! the sequence per hop, creating a child batch of fresh PRs and then
//! enqueueing a follow-up hop for that child. The chain ends when there is
//! no later active branch.
//!
//! Job kinds:
//! - [`PortKind::FromMerge`]: first hop after a batch merged.
//! - [`PortKind::FollowUp`]: subsequent hop, enqueued by the previous one.
//! - [`PortKind::InsertNewBranch`]: a branch appeared mid-sequence; port the
//!   batch that used to be the direct predecessor and splice the result into
//!   the existing chain.
//! - [`PortKind::CompleteDescendants`]: a PR joined a batch whose siblings
//!   already ported onward; catch it up through the existing descendant
//!   batches.

use serde::{Deserialize, Serialize};

use crate::types::{BatchId, PrId};

pub mod complete;
pub mod hop;
pub mod insert;
pub mod job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    FromMerge,
    FollowUp,
    InsertNewBranch,
    CompleteDescendants,
}

/// Payload of a forward-port job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRequest {
    /// Batch the job operates on.
    pub batch: BatchId,

    pub kind: PortKind,

    /// For [`PortKind::CompleteDescendants`]: the late-added PR to catch up.
    /// Unused by the other kinds.
    pub pr: Option<PrId>,
}
