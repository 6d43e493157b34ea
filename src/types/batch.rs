//! Batches: the unit of forward-porting.

use serde::{Deserialize, Serialize};

use super::ids::{BatchId, BranchName, PrId};

/// A set of pull requests (at most one per repository) that are forward-ported
/// together as an atomic unit.
///
/// `parent_id` links a batch to the batch it was ported from, forming a chain
/// that parallels the PR-level `parent_id` lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,

    /// Branch every PR in this batch targets.
    pub target: BranchName,

    /// Batch this one was ported from, if any.
    pub parent_id: Option<BatchId>,

    /// Member PRs, at most one per repository.
    pub prs: Vec<PrId>,
}

impl Batch {
    pub fn new(id: BatchId, target: impl Into<BranchName>, parent_id: Option<BatchId>) -> Self {
        Batch {
            id,
            target: target.into(),
            parent_id,
            prs: Vec::new(),
        }
    }
}
