//! Differential storage engine
//!
//! Snapshots are stored as records in an arena keyed by snapshot id:
//!
//! ```text
//! full(A) <- differential(B) <- differential(C)
//!   a.js: created            a.js: modified      b.js: unchanged -> (A, b.js)
//!   b.js: created            c.js: deleted
//! ```
//!
//! - Every record's `base_id` chain ends in exactly one `full` record.
//! - Identical bytes are stored once: later entries hold an `unchanged`
//!   back-reference to the record that owns the content, found through the
//!   [`FileVersionTracker`](crate::tracking::FileVersionTracker).
//! - Capacity is enforced before every store by evicting the oldest records.
//!   An evicted record is folded into its child and references to it are
//!   rewritten, so surviving snapshots keep reconstructing.

mod engine;
mod eviction;
mod reconstruct;
mod types;


pub use engine::DifferentialStore;
pub use reconstruct::ReconstructedState;
pub use types::{
    AppendOutcome, CapacityState, DifferentialRecord, EntryPayload, EvictionReport, FileAction, FileEntry,
    RecordKind, ReferenceRepairWarning, SnapshotPayload, StoreReceipt,
};
