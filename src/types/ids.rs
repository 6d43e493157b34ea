//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! BatchId where a PrId is expected) and make the code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal identifier of a pull request record.
///
/// Distinct from the forge-side PR number: the engine tracks PRs across
/// repositories, and forge numbers are only unique per repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrId(pub u64);

impl fmt::Display for PrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pr{}", self.0)
    }
}

impl From<u64> for PrId {
    fn from(n: u64) -> Self {
        PrId(n)
    }
}

/// Identifier of a batch (the unit of forward-porting, at most one PR per
/// repository).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch{}", self.0)
    }
}

impl From<u64> for BatchId {
    fn from(n: u64) -> Self {
        BatchId(n)
    }
}

/// Identifier of a queued job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(n: u64) -> Self {
        JobId(n)
    }
}

/// A git commit SHA (40 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha(pub String);

impl Sha {
    /// Creates a new Sha from a string.
    ///
    /// Note: This does not validate the format. Valid SHAs are 40 hex characters.
    pub fn new(s: impl Into<String>) -> Self {
        Sha(s.into())
    }

    /// Returns the SHA as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (7-character) version of the SHA for display.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Sha {
    fn from(s: String) -> Self {
        Sha(s)
    }
}

impl From<&str> for Sha {
    fn from(s: &str) -> Self {
        Sha(s.to_string())
    }
}

/// A branch name (a release branch of the ordered sequence, or a forward-port
/// working branch).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(pub String);

impl BranchName {
    pub fn new(s: impl Into<String>) -> Self {
        BranchName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BranchName {
    fn from(s: &str) -> Self {
        BranchName(s.to_string())
    }
}

impl From<String> for BranchName {
    fn from(s: String) -> Self {
        BranchName(s)
    }
}

/// A repository identifier (owner/repo format).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn sha_short_returns_7_chars(s in "[0-9a-f]{40}") {
            let sha = Sha::new(&s);
            prop_assert_eq!(sha.short().len(), 7);
            prop_assert_eq!(sha.short(), &s[..7]);
        }

        #[test]
        fn pr_id_serde_roundtrip(n: u64) {
            let id = PrId(n);
            let json = serde_json::to_string(&id).unwrap();
            let parsed: PrId = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(id, parsed);
        }
    }

    #[test]
    fn sha_short_handles_short_input() {
        let sha = Sha::new("abc");
        assert_eq!(sha.short(), "abc");
    }

    #[test]
    fn repo_id_display() {
        let repo = RepoId::new("owner", "project");
        assert_eq!(format!("{}", repo), "owner/project");
    }
}
