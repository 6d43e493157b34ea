//! Splicing a freshly ported batch into an existing chain.
//!
//! When a branch is inserted mid-sequence, the batches that used to be
//! adjacent already have their own descendant chains. After the predecessor
//! batch has been ported onto the new branch (producing `new_batch`), this
//! pass rewires the bookkeeping so the new hop sits between them:
//!
//! - Descendant batches of the old batch are reparented under the new one.
//! - Each new PR adopts the downstream PR of its lineage as its forward
//!   child, inheriting that PR's recorded approval so review state is not
//!   lost across the splice. A detached downstream PR stays detached.

use crate::store::{lineage, Store};
use crate::types::BatchId;

pub(super) fn relink(store: &mut Store, old_batch: BatchId, new_batch: BatchId) {
    let children: Vec<BatchId> = store
        .batches
        .values()
        .filter(|b| b.parent_id == Some(old_batch) && b.id != new_batch)
        .map(|b| b.id)
        .collect();
    for child in children {
        if let Some(batch) = store.batch_mut(child) {
            batch.parent_id = Some(new_batch);
        }
    }

    let new_prs = match store.batch(new_batch) {
        Some(b) => b.prs.clone(),
        None => return,
    };
    let Some(new_target) = store.batch(new_batch).map(|b| b.target.clone()) else {
        return;
    };
    let Some(downstream_target) = store.next_branch_after(&new_target).map(|b| b.name.clone())
    else {
        return;
    };

    for p in new_prs {
        let Some(source_id) = store.pr(p).map(|pr| pr.source_id) else {
            continue;
        };
        let Some(q) = lineage::open_pr_at(store, source_id, &downstream_target) else {
            continue;
        };
        let (reviewed_by, detached) = {
            let q = &store.prs[&q];
            (q.reviewed_by.clone(), q.is_detached())
        };
        if let Some(new_pr) = store.pr_mut(p) {
            new_pr.reviewed_by = reviewed_by;
        }
        if !detached && let Some(q) = store.pr_mut(q) {
            q.parent_id = Some(p);
        }
        tracing::debug!(spliced = %p, downstream = %q, "relinked chain across inserted branch");
    }
}
