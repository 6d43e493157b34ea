//! Release branch sequence membership.

use serde::{Deserialize, Serialize};

use super::ids::BranchName;

/// An ordered member of the project's release branch sequence.
///
/// `sequence` defines the forward-port direction: a change merged into a
/// branch is reproduced on every active branch with a strictly greater
/// sequence number, oldest to newest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: BranchName,

    /// Position in the forward-port order. Strictly increasing across the
    /// sequence; renumbered when a branch is inserted.
    pub sequence: u32,

    /// Inactive branches (frozen or retired releases) are skipped when
    /// computing the next port target.
    pub active: bool,
}

impl Branch {
    pub fn new(name: impl Into<BranchName>, sequence: u32) -> Self {
        Branch {
            name: name.into(),
            sequence,
            active: true,
        }
    }
}
