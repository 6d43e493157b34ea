//! Lineage queries over the PR graph.
//!
//! The forward-port chain is an implicit graph: `parent_id` points to the
//! immediate predecessor hop, `source_id` to the root of the whole chain.
//! These functions materialize the views jobs need: the ordered descendant
//! chain of a PR, and membership lookups within one `source_id` lineage.

use crate::types::{BranchName, PrId};

use super::Store;

/// The direct forward-port child of a PR: the PR whose `parent_id` points at
/// it. If data has degraded into several children, the one targeting the
/// oldest branch wins (it is the next hop in port order).
pub fn child_of(store: &Store, pr: PrId) -> Option<PrId> {
    store
        .prs
        .values()
        .filter(|p| p.parent_id == Some(pr))
        .min_by_key(|p| (store.branch_sequence(&p.target), p.id))
        .map(|p| p.id)
}

/// The ordered chain of forward-port descendants of `root`, excluding `root`
/// itself, following `parent_id` links hop by hop. Stops at a detached PR
/// (which roots its own sub-lineage).
pub fn forward_chain(store: &Store, root: PrId) -> Vec<PrId> {
    let mut chain = Vec::new();
    let mut cur = root;
    while let Some(next) = child_of(store, cur) {
        // A cycle would mean corrupted lineage pointers; stop rather than
        // spin.
        if chain.contains(&next) || next == root {
            break;
        }
        chain.push(next);
        cur = next;
    }
    chain
}

/// Finds an open PR of the given lineage targeting `target`, if any.
pub fn open_pr_at(store: &Store, source_id: PrId, target: &BranchName) -> Option<PrId> {
    store
        .prs
        .values()
        .find(|p| p.source_id == source_id && &p.target == target && p.state.is_open())
        .map(|p| p.id)
}

/// Every PR of a lineage, ordered by target branch sequence.
pub fn members(store: &Store, source_id: PrId) -> Vec<PrId> {
    let mut out: Vec<PrId> = store
        .prs
        .values()
        .filter(|p| p.source_id == source_id)
        .map(|p| p.id)
        .collect();
    out.sort_by_key(|id| {
        let pr = &store.prs[id];
        (store.branch_sequence(&pr.target), pr.id)
    });
    out
}
