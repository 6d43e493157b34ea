//! External collaborator gateways.
//!
//! The engine never talks to git or the forge REST API directly; it goes
//! through these two traits. The trait-based design enables:
//! - Pure core logic testable with scripted mocks
//! - Logging/tracing wrappers
//! - Swapping the hosting platform without touching the jobs
//!
//! All ref writes go through [`VcsGateway::push`] with per-ref
//! compare-and-swap preconditions (force-with-lease): each ref independently
//! succeeds or reports a lease rejection, there is no cross-ref transaction.
//! The authoritative remote lives outside this process, so preconditions
//! rather than locks guard it.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::types::{BranchName, ConflictReport, RepoId, Sha};

pub mod error;
pub mod forge;
pub mod git;

pub use error::{GatewayError, GatewayErrorKind};
pub use forge::OctocrabForge;
pub use git::CliVcs;

/// A single ref edit with its precondition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RefEdit {
    /// Create the ref; fails if it already exists.
    Create { new: Sha },

    /// Move the ref to `new`; fails unless the remote still points at
    /// `expected`.
    Update { new: Sha, expected: Sha },

    /// Delete the ref; fails unless the remote still points at `expected`.
    Delete { expected: Sha },
}

/// A ref edit bound to a branch name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefPush {
    pub branch: BranchName,
    pub edit: RefEdit,
}

impl RefPush {
    pub fn create(branch: impl Into<BranchName>, new: Sha) -> Self {
        RefPush {
            branch: branch.into(),
            edit: RefEdit::Create { new },
        }
    }

    pub fn update(branch: impl Into<BranchName>, new: Sha, expected: Sha) -> Self {
        RefPush {
            branch: branch.into(),
            edit: RefEdit::Update { new, expected },
        }
    }

    pub fn delete(branch: impl Into<BranchName>, expected: Sha) -> Self {
        RefPush {
            branch: branch.into(),
            edit: RefEdit::Delete { expected },
        }
    }
}

/// Per-ref outcome of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefPushOutcome {
    /// The edit was applied.
    Applied,

    /// The precondition failed: someone moved the ref since we observed it.
    /// `actual` is the remote's current value when the gateway could tell.
    LeaseRejected { actual: Option<Sha> },
}

impl RefPushOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, RefPushOutcome::Applied)
    }
}

/// Result of one ref edit within a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefPushResult {
    pub branch: BranchName,
    pub outcome: RefPushOutcome,
}

/// Result of creating a port branch: the new head, plus conflict diagnostics
/// when the cherry-pick did not apply cleanly (the commit then contains
/// conflict markers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOutcome {
    pub new_head: Sha,
    pub conflict: Option<ConflictReport>,
}

/// Version-control side effects: fetch, precondition-guarded pushes, and the
/// "reproduce this commit onto that branch" primitive.
///
/// The cherry-pick mechanics behind [`create_port_branch`] (three-way merge,
/// commit construction) are entirely the implementation's concern; jobs only
/// see the resulting head and conflict diagnostics.
///
/// [`create_port_branch`]: VcsGateway::create_port_branch
pub trait VcsGateway: Send + Sync {
    /// Fetch the given refspecs from the repository's canonical remote.
    fn fetch(
        &self,
        repo: &RepoId,
        refspecs: &[String],
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Apply a set of ref edits on the forward-port remote.
    ///
    /// Each ref succeeds or fails independently; a lease rejection on one ref
    /// never rolls back another. A `Result::Err` means the push as a whole
    /// could not be attempted (network, auth).
    fn push(
        &self,
        repo: &RepoId,
        edits: &[RefPush],
    ) -> impl Future<Output = Result<Vec<RefPushResult>, GatewayError>> + Send;

    /// Reproduce `source` on top of `target`, returning the new commit and
    /// conflict diagnostics if the change did not apply cleanly.
    fn create_port_branch(
        &self,
        repo: &RepoId,
        source: &Sha,
        target: &BranchName,
    ) -> impl Future<Output = Result<PortOutcome, GatewayError>> + Send;

    /// Count commits in a revision range (`git rev-list --count`).
    fn rev_list_count(
        &self,
        repo: &RepoId,
        range: &str,
    ) -> impl Future<Output = Result<u64, GatewayError>> + Send;
}

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    /// Base branch the PR targets.
    pub base: BranchName,

    /// Head in `owner:branch` form.
    pub head: String,

    pub title: String,
    pub body: String,
}

/// Forge REST side effects, authenticated with a per-project bearer token.
///
/// Non-2xx responses surface as [`GatewayError`] with the response body in the
/// message.
pub trait ForgeGateway: Send + Sync {
    /// Open a pull request; returns the forge-side PR number.
    fn create_pull_request(
        &self,
        repo: &RepoId,
        spec: &NewPullRequest,
    ) -> impl Future<Output = Result<u64, GatewayError>> + Send;

    /// Delete a branch ref on the forge.
    fn delete_branch(
        &self,
        repo: &RepoId,
        branch: &BranchName,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Add labels to a PR.
    fn add_labels(
        &self,
        repo: &RepoId,
        number: u64,
        labels: &[String],
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Post a comment on a PR.
    fn post_comment(
        &self,
        repo: &RepoId,
        number: u64,
        body: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{arb_branch_name, arb_sha};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ref_push_constructors_carry_their_preconditions(
            branch in arb_branch_name(),
            new in arb_sha(),
            expected in arb_sha(),
        ) {
            let create = RefPush::create(branch.clone(), new.clone());
            prop_assert_eq!(&create.edit, &RefEdit::Create { new: new.clone() });
            prop_assert!(create.branch == branch);

            let update = RefPush::update(branch.clone(), new.clone(), expected.clone());
            prop_assert_eq!(
                &update.edit,
                &RefEdit::Update { new, expected: expected.clone() }
            );

            let delete = RefPush::delete(branch, expected.clone());
            prop_assert_eq!(&delete.edit, &RefEdit::Delete { expected });
        }
    }

    #[test]
    fn lease_rejection_is_not_applied() {
        assert!(RefPushOutcome::Applied.is_applied());
        assert!(
            !RefPushOutcome::LeaseRejected { actual: None }.is_applied()
        );
    }
}
