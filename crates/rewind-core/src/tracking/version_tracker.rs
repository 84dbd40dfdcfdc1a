//! Checksum -> content holder index

use crate::types::SnapshotId;
use std::collections::HashMap;
use std::path::PathBuf;

/// Where the bytes for one checksum are stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    pub snapshot_id: SnapshotId,
    pub path: PathBuf,
    pub size: u64,
}

/// Index of stored content by checksum
///
/// Only concrete content is ever registered, so every entry points at a
/// record entry holding bytes, never at another reference.
#[derive(Debug, Default)]
pub struct FileVersionTracker {
    by_checksum: HashMap<String, VersionEntry>,
}

impl FileVersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a holder; the last writer wins per checksum
    pub fn register(
        &mut self,
        checksum: impl Into<String>,
        snapshot_id: SnapshotId,
        path: impl Into<PathBuf>,
        size: u64,
    ) {
        self.by_checksum.insert(
            checksum.into(),
            VersionEntry {
                snapshot_id,
                path: path.into(),
                size,
            },
        );
    }

    /// Find the holder of a checksum
    pub fn lookup(&self, checksum: &str) -> Option<&VersionEntry> {
        self.by_checksum.get(checksum)
    }

    /// Whether any snapshot holds this checksum
    pub fn contains(&self, checksum: &str) -> bool {
        self.by_checksum.contains_key(checksum)
    }

    /// Point a checksum at a different holder
    pub fn repoint(&mut self, checksum: &str, entry: VersionEntry) {
        self.by_checksum.insert(checksum.to_string(), entry);
    }

    /// Drop a checksum entirely
    pub fn forget(&mut self, checksum: &str) -> Option<VersionEntry> {
        self.by_checksum.remove(checksum)
    }

    /// Checksums currently held by a snapshot
    pub fn checksums_held_by(&self, snapshot_id: &SnapshotId) -> Vec<String> {
        let mut checksums: Vec<String> = self
            .by_checksum
            .iter()
            .filter(|(_, entry)| &entry.snapshot_id == snapshot_id)
            .map(|(checksum, _)| checksum.clone())
            .collect();
        checksums.sort();
        checksums
    }

    /// Number of distinct blobs
    pub fn len(&self) -> usize {
        self.by_checksum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_checksum.is_empty()
    }

    /// Sum of distinct blob sizes
    pub fn unique_bytes(&self) -> u64 {
        self.by_checksum.values().map(|e| e.size).sum()
    }
}
