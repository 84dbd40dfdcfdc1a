//! Snapshot manager
//!
//! The public entry point: creates snapshots before instructions run, backs
//! up files on first touch, and restores, lists and searches snapshots. It
//! picks the git strategy when the project is a usable repository and the
//! in-memory file strategy otherwise, degrading to files for the rest of the
//! session if git fails.

mod core;
mod git_ops;
mod operations;
mod restore;
#[cfg(test)]
mod tests;
mod types;

pub use types::{BackupReport, SnapshotManager};
