//! Git-backed snapshot strategy
//!
//! Snapshots become commits on a per-session feature branch. All git access
//! goes through [`GitRunner`] so the state machine can be driven without a
//! git binary.

mod integration;
mod message;
mod runner;
mod session;

#[cfg(test)]
pub(crate) mod testing;


pub use integration::{GitIntegration, GitLogEntry, GitProbe};
pub use message::{commit_message, parse_porcelain};
pub use runner::{GitCli, GitOutput, GitRunner};
pub use session::{GitSessionState, GitStatus};
