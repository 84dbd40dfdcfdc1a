//! Error types for Rewind
//!
//! Every fallible operation in this crate returns [`RewindResult`]. The
//! variants map onto the failure classes callers need to tell apart:
//! - `Validation`: malformed input rejected before any mutation
//! - `NotFound` / `AmbiguousId`: id resolution, never merged into one
//! - `Capacity`: the store could not admit an item and was left unchanged
//! - `Git`: a git subprocess failed or timed out

mod constructors;
mod conversions;
mod types;
mod unified_error;

pub use types::{RewindError, RewindResult, UnifiedError};
