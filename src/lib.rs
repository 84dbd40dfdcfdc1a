//! Rewind
//!
//! Snapshot and rollback for AI-driven code edits. See [`rewind_core`] for
//! the engine; this crate re-exports it.

pub use rewind_core::*;
