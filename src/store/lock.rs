//! Non-blocking advisory locks on PR rows.
//!
//! The update cascade must not rewrite a PR that another job is extending, so
//! it takes an exclusive per-PR lock before mutating. Locks are try-only: a
//! conflict fails fast (the job retries later) instead of blocking the
//! single-threaded queue poller. Guards release on drop, scoping the lock to
//! one job attempt; a store rollback does not affect held locks.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::types::PrId;

/// Table of currently held PR locks.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashSet<PrId>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to take the exclusive lock on a PR. Returns `None` on
    /// contention, never blocks.
    pub fn try_lock(&self, pr: PrId) -> Option<PrLock<'_>> {
        let mut held = self.held.lock().expect("lock table poisoned");
        if held.insert(pr) {
            Some(PrLock { table: self, pr })
        } else {
            None
        }
    }

    /// True if the PR is currently locked (diagnostic only; the answer is
    /// stale the moment it returns).
    pub fn is_locked(&self, pr: PrId) -> bool {
        self.held.lock().expect("lock table poisoned").contains(&pr)
    }
}

/// Guard for one held PR lock; releases on drop.
#[derive(Debug)]
pub struct PrLock<'a> {
    table: &'a LockTable,
    pr: PrId,
}

impl Drop for PrLock<'_> {
    fn drop(&mut self) {
        self.table
            .held
            .lock()
            .expect("lock table poisoned")
            .remove(&self.pr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_lock_is_exclusive() {
        let table = LockTable::new();
        let guard = table.try_lock(PrId(1)).unwrap();
        assert!(table.try_lock(PrId(1)).is_none());
        assert!(table.is_locked(PrId(1)));
        drop(guard);
        assert!(!table.is_locked(PrId(1)));
        assert!(table.try_lock(PrId(1)).is_some());
    }

    #[test]
    fn locks_on_different_prs_are_independent() {
        let table = LockTable::new();
        let _a = table.try_lock(PrId(1)).unwrap();
        let _b = table.try_lock(PrId(2)).unwrap();
        assert!(table.is_locked(PrId(1)));
        assert!(table.is_locked(PrId(2)));
    }
}
