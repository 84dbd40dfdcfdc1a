//! Snapshot metadata index
//!
//! Metadata for every live snapshot, indexed by time, instruction keyword,
//! tag, author and session so listing and search never touch file content.

mod index;
mod query;

#[cfg(test)]
mod tests;

pub use index::{SnapshotIndex, extract_keywords};
pub use query::SnapshotQuery;
