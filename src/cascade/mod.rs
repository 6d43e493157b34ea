//! Update cascades: re-propagating an amended PR through its descendants.
//!
//! When a tracked PR gets a new head, every still-attached descendant hop
//! must be rebuilt on top of the new contents. The cascade walks all chains
//! of the amended PR's batch in lockstep, one level at a time, rewriting
//! each descendant's head branch in place with a compare-and-swap push.
//!
//! The walk halts at the first level containing a merged or closed PR:
//! rewriting past it would publish contents that were never reviewed at the
//! finished level. Work completed on earlier levels is still pushed.

use serde::{Deserialize, Serialize};

use crate::types::PrId;

pub mod job;

/// Payload of an update-cascade job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// The PR whose amendment triggered the cascade, before it was detached
    /// from its own ancestors. This is the chain's `source_id`.
    pub original_root: PrId,

    /// The amended PR itself: propagation starts from its new head.
    pub new_root: PrId,
}
