//! Change detection and content version tracking
//!
//! - [`ContentChangeDetector`] decides whether a file needs to be read and
//!   hashed again, using a size+mtime fast path.
//! - [`FileVersionTracker`] maps each checksum to the snapshot that holds its
//!   bytes, which is what lets the storage engine deduplicate.

mod change_detector;
mod version_tracker;


pub use change_detector::{ContentChangeDetector, FileFingerprint, Probe};
pub use version_tracker::{FileVersionTracker, VersionEntry};
