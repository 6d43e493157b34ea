//! Pull request records and lifecycle state.
//!
//! Every forward-ported PR carries two lineage pointers: `source_id` is the
//! root of the whole chain and never changes once set; `parent_id` is the
//! immediate predecessor hop and may be cleared ("detached") when a conflict
//! occurs or the PR is amended independently. A detached PR starts a new
//! sub-lineage under the same `source_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BatchId, BranchName, PrId, RepoId, Sha};

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    /// Freshly opened, CI not yet green.
    Opened,

    /// CI passed.
    Validated,

    /// A reviewer approved.
    Approved,

    /// Validated and approved, can be staged.
    Ready,

    /// Merged into its target branch.
    Merged,

    /// Closed without merging.
    Closed,

    /// Staging or CI failed; needs attention before it can progress.
    Error,
}

impl PrState {
    /// Returns true while the PR is still live on the forge (not merged or
    /// closed). `Error` counts as open: it still receives events.
    pub fn is_open(&self) -> bool {
        !self.is_finished()
    }

    /// Returns true once the PR has reached a terminal state (merged or
    /// closed). Finished PRs stop receiving update events from the hosting
    /// platform, so their recorded head can no longer be trusted.
    pub fn is_finished(&self) -> bool {
        matches!(self, PrState::Merged | PrState::Closed)
    }
}

/// Diagnostics captured when a port attempt hit a merge conflict.
///
/// Mirrors the output of the underlying cherry-pick: exit code plus raw
/// stdout/stderr, surfaced verbatim in notices so the author can reproduce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ConflictReport {
    pub fn new(returncode: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        ConflictReport {
            returncode,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// One block of text suitable for embedding in a notice comment.
    pub fn summary(&self) -> String {
        let mut out = format!("cherry-pick exited with status {}", self.returncode);
        if !self.stdout.trim().is_empty() {
            out.push('\n');
            out.push_str(self.stdout.trim_end());
        }
        if !self.stderr.trim().is_empty() {
            out.push('\n');
            out.push_str(self.stderr.trim_end());
        }
        out
    }
}

/// A pull request tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: PrId,

    /// Repository the PR lives in.
    pub repo: RepoId,

    /// Forge-side PR number (unique per repository only).
    pub number: u64,

    /// Base branch the PR targets (a member of the ordered branch sequence).
    pub target: BranchName,

    /// Last known head commit.
    pub head: Sha,

    /// Name of the head branch in the forward-port namespace.
    pub head_ref: BranchName,

    /// Source branch identifier in `owner:branch` form, as the forge reports
    /// it. The owner half is what the retirement safety check validates.
    pub label: String,

    pub state: PrState,

    /// Login of the approving reviewer, if any.
    pub reviewed_by: Option<String>,

    /// Root of the forward-port chain this PR descends from. Immutable.
    pub source_id: PrId,

    /// Immediate predecessor hop. `None` means detached.
    pub parent_id: Option<PrId>,

    /// Batch this PR belongs to.
    pub batch_id: BatchId,

    /// Diagnostics of the conflict that occurred while porting into this PR,
    /// if any.
    pub conflict: Option<ConflictReport>,

    /// When the PR was merged or closed.
    pub closed_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Clears the parent pointer, making this PR the root of a new
    /// sub-lineage. `source_id` is preserved.
    pub fn detach(&mut self) {
        self.parent_id = None;
    }

    /// Returns true if the parent pointer has been cleared.
    pub fn is_detached(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The owner half of the `owner:branch` label, if well-formed.
    pub fn label_owner(&self) -> Option<&str> {
        self.label.split_once(':').map(|(owner, _)| owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pr() -> PullRequest {
        PullRequest {
            id: PrId(1),
            repo: RepoId::new("owner", "project"),
            number: 100,
            target: BranchName::new("a"),
            head: Sha::new("a".repeat(40)),
            head_ref: BranchName::new("feature"),
            label: "fw-bot:feature".to_string(),
            state: PrState::Opened,
            reviewed_by: None,
            source_id: PrId(1),
            parent_id: None,
            batch_id: BatchId(1),
            conflict: None,
            closed_at: None,
        }
    }

    #[test]
    fn finished_states() {
        assert!(PrState::Merged.is_finished());
        assert!(PrState::Closed.is_finished());
        assert!(!PrState::Opened.is_finished());
        assert!(!PrState::Error.is_finished());
        assert!(PrState::Error.is_open());
    }

    #[test]
    fn detach_clears_parent_but_not_source() {
        let mut pr = sample_pr();
        pr.parent_id = Some(PrId(7));
        pr.detach();
        assert!(pr.is_detached());
        assert_eq!(pr.source_id, PrId(1));
    }

    #[test]
    fn label_owner_parses_well_formed_labels() {
        let mut pr = sample_pr();
        assert_eq!(pr.label_owner(), Some("fw-bot"));
        pr.label = "no-colon".to_string();
        assert_eq!(pr.label_owner(), None);
    }
}
