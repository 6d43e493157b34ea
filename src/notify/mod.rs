//! Human-facing PR comments.
//!
//! Jobs surface everything a maintainer must act on (conflicts, halted
//! cascades, refused deletions) as comments on the affected PRs. Comment
//! delivery is best-effort: a failed comment is logged and never fails the
//! job that posted it, since the underlying work already happened.

use crate::gateway::ForgeGateway;
use crate::types::{BranchName, ConflictReport, RepoId};

/// Posts a comment, logging on failure instead of propagating it.
pub async fn post<F: ForgeGateway>(forge: &F, repo: &RepoId, number: u64, body: &str) {
    if let Err(e) = forge.post_comment(repo, number, body).await {
        tracing::warn!(repo = %repo, number, error = %e, "failed to post notice comment");
    }
}

/// Notice on a freshly created PR whose port carried conflict markers.
pub fn conflict_notice(target: &BranchName, report: &ConflictReport) -> String {
    format!(
        "Cherry-picking onto `{target}` hit conflicts; the conflict markers have been \
         committed as-is and this PR needs manual resolution before it can merge.\n\n\
         ```\n{}\n```",
        report.summary()
    )
}

/// Notice on the predecessor PR pointing at its conflicted port.
pub fn predecessor_conflict_notice(target: &BranchName, port_number: u64) -> String {
    format!(
        "The forward port of this PR to `{target}` (#{port_number}) has conflicts and was \
         detached from the chain. Updates to this PR will no longer propagate past it."
    )
}

/// Notice on each still-open descendant when a cascade stops at a finished
/// PR.
pub fn cascade_halted_notice(finished_number: u64) -> String {
    format!(
        "An update to an ancestor of this PR could not be propagated here because \
         #{finished_number} further up the chain is already merged or closed. This PR \
         was left untouched and needs a manual update."
    )
}

/// Notice on the finished PR itself: the engine saw an ancestor update it
/// could not apply here.
pub fn cascade_finished_pr_notice() -> String {
    "An ancestor of this PR was updated, but this PR is already merged or closed, so the \
     update was not applied here and propagation down the chain has stopped."
        .to_string()
}

/// Notice on the predecessor of the finished PR that halted a cascade.
pub fn cascade_blocked_notice(finished_number: u64) -> String {
    format!(
        "The update to this PR stopped propagating at #{finished_number}, which is \
         already merged or closed."
    )
}

/// Notice posted when the recorded chain disagrees with the branch sequence.
pub fn sequence_inconsistency_notice(expected: &BranchName, found: &BranchName) -> String {
    format!(
        "Chain bookkeeping is inconsistent: the next port should target `{expected}` but \
         the recorded descendant targets `{found}`. Forward porting has been stopped for \
         this chain; please inspect it manually."
    )
}

/// Notice posted on the predecessor when its change was already present on
/// the next branch, so no port PR was opened.
pub fn nothing_to_port_notice(target: &BranchName) -> String {
    format!(
        "`{target}` already contains this change; no forward-port PR was opened for it."
    )
}

/// Notice posted when retirement refuses to delete a branch the bot does
/// not own.
pub fn ownership_refusal_notice(owner: &str, branch: &BranchName) -> String {
    format!(
        "Skipping deletion of head branch `{branch}`: it belongs to `{owner}`, not to \
         this bot. Delete it manually if it is no longer needed."
    )
}

/// Notice posted on the predecessor when creating the port PR failed after
/// the branch was already pushed.
pub fn creation_failed_notice(target: &BranchName, error: &str) -> String {
    format!(
        "Failed to open the forward-port PR onto `{target}`: {error}. The pushed port \
         branch has been removed; this port will not be retried automatically."
    )
}
