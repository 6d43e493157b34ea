//! Core domain types for the forward-port engine.
//!
//! This module contains all the fundamental types used throughout the
//! application, designed to encode invariants via the type system.

pub mod batch;
pub mod branch;
pub mod ids;
pub mod pr;

// Re-export commonly used types at the module level
pub use batch::Batch;
pub use branch::Branch;
pub use ids::{BatchId, BranchName, JobId, PrId, RepoId, Sha};
pub use pr::{ConflictReport, PrState, PullRequest};
