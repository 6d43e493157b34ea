//! Forward-port engine: replays merged changes across an ordered sequence
//! of release branches.
//!
//! Merged work enters at one branch and is cherry-picked hop by hop onto
//! every later branch, as a chain of bot-owned pull requests. The engine is
//! driven entirely by three durable work queues (forward ports, update
//! cascades, branch retirement); HTTP ingress only translates signed forge
//! events into queue rows.

pub mod cascade;
pub mod config;
pub mod events;
pub mod gateway;
pub mod notify;
pub mod port;
pub mod queue;
pub mod retire;
pub mod server;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod test_utils;
