//! Storage record types

use crate::types::SnapshotId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Fixed accounting cost of a record
pub(crate) const RECORD_OVERHEAD: u64 = 256;

/// Fixed accounting cost of an entry, on top of its strings and content
pub(crate) const ENTRY_OVERHEAD: u64 = 96;

/// Whether a record stands alone or builds on a base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Full,
    Differential,
}

/// What happened to a path relative to the base state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Created,
    Modified,
    /// Content identical to bytes held elsewhere; stored as a reference
    Unchanged,
    Deleted,
}

/// Where an entry's bytes are
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPayload {
    /// Bytes owned by this entry
    Content(Vec<u8>),
    /// Bytes owned by another record's entry (always a concrete holder)
    Reference { snapshot_id: SnapshotId, path: PathBuf },
    /// Path does not exist
    Absent,
    /// Reference whose holder was evicted with no replacement
    Dropped,
}

impl EntryPayload {
    pub(crate) fn is_reference_to(&self, id: &SnapshotId, target: &Path) -> bool {
        matches!(self, EntryPayload::Reference { snapshot_id, path } if snapshot_id == id && path.as_path() == target)
    }
}

/// One path inside a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub action: FileAction,
    /// `None` for deletions
    pub checksum: Option<String>,
    pub size: u64,
    pub payload: EntryPayload,
}

impl FileEntry {
    pub(crate) fn content(action: FileAction, checksum: String, bytes: Vec<u8>) -> Self {
        Self {
            action,
            checksum: Some(checksum),
            size: bytes.len() as u64,
            payload: EntryPayload::Content(bytes),
        }
    }

    pub(crate) fn reference(checksum: String, size: u64, holder: SnapshotId, path: PathBuf) -> Self {
        Self {
            action: FileAction::Unchanged,
            checksum: Some(checksum),
            size,
            payload: EntryPayload::Reference {
                snapshot_id: holder,
                path,
            },
        }
    }

    pub(crate) fn deleted() -> Self {
        Self {
            action: FileAction::Deleted,
            checksum: None,
            size: 0,
            payload: EntryPayload::Absent,
        }
    }

    /// Bytes if this entry owns them
    pub fn concrete(&self) -> Option<&[u8]> {
        match &self.payload {
            EntryPayload::Content(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Holder of a back-reference
    pub fn reference_target(&self) -> Option<(&SnapshotId, &Path)> {
        match &self.payload {
            EntryPayload::Reference { snapshot_id, path } => Some((snapshot_id, path.as_path())),
            _ => None,
        }
    }

    /// Accounting cost of this entry at `path`
    pub(crate) fn memory_cost(&self, path: &Path) -> u64 {
        let strings = path.as_os_str().len() as u64
            + self.checksum.as_ref().map_or(0, |c| c.len() as u64);
        let payload = match &self.payload {
            EntryPayload::Content(bytes) => bytes.len() as u64,
            EntryPayload::Reference { snapshot_id, path } => {
                (snapshot_id.as_str().len() + path.as_os_str().len()) as u64
            }
            EntryPayload::Absent | EntryPayload::Dropped => 0,
        };
        ENTRY_OVERHEAD + strings + payload
    }
}

/// Stored form of one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferentialRecord {
    pub id: SnapshotId,
    pub kind: RecordKind,
    /// `None` iff `kind == Full`
    pub base_id: Option<SnapshotId>,
    pub entries: BTreeMap<PathBuf, FileEntry>,
    /// Insertion order; eviction removes the lowest first
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl DifferentialRecord {
    pub fn is_full(&self) -> bool {
        self.kind == RecordKind::Full
    }

    /// Bytes owned by this record
    pub fn content_bytes(&self) -> u64 {
        self.entries
            .values()
            .filter_map(|e| e.concrete())
            .map(|b| b.len() as u64)
            .sum()
    }

    /// Accounting cost of this record
    pub fn memory_cost(&self) -> u64 {
        RECORD_OVERHEAD
            + self.id.as_str().len() as u64
            + self
                .entries
                .iter()
                .map(|(path, entry)| entry.memory_cost(path))
                .sum::<u64>()
    }

    /// Number of entries with the given action
    pub fn count(&self, action: FileAction) -> usize {
        self.entries.values().filter(|e| e.action == action).count()
    }
}

/// Input to `store` / `store_differential`
#[derive(Debug, Clone, Default)]
pub struct SnapshotPayload {
    pub id: Option<SnapshotId>,
    /// Path -> content; `None` records the path as absent
    pub files: BTreeMap<PathBuf, Option<Vec<u8>>>,
}

impl SnapshotPayload {
    pub fn new(id: SnapshotId) -> Self {
        Self {
            id: Some(id),
            files: BTreeMap::new(),
        }
    }

    /// Add a file with content
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), Some(content.into()));
        self
    }

    /// Add a path that does not exist
    pub fn with_absent(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.insert(path.into(), None);
        self
    }
}

/// Snapshot count and memory usage against their limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityState {
    pub snapshot_count: usize,
    pub memory_usage_bytes: u64,
    pub max_snapshots: usize,
    pub memory_limit_bytes: u64,
    /// Distinct content blobs
    pub unique_blobs: usize,
}

impl CapacityState {
    pub fn within_limits(&self) -> bool {
        self.snapshot_count <= self.max_snapshots
            && self.memory_usage_bytes <= self.memory_limit_bytes
    }
}

/// An `unchanged` entry lost its content holder during eviction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRepairWarning {
    /// Record that held the content
    pub holder_id: SnapshotId,
    pub referencing_id: SnapshotId,
    pub path: PathBuf,
    pub checksum: Option<String>,
}

impl std::fmt::Display for ReferenceRepairWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "snapshot {} lost content for {} (holder {} removed, no other copy)",
            self.referencing_id.short(),
            self.path.display(),
            self.holder_id.short()
        )
    }
}

/// Records removed to make room, and the references that could not be repaired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub evicted: Vec<SnapshotId>,
    pub warnings: Vec<ReferenceRepairWarning>,
}

impl EvictionReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.warnings.is_empty()
    }

    pub(crate) fn merge(&mut self, other: EvictionReport) {
        self.evicted.extend(other.evicted);
        self.warnings.extend(other.warnings);
    }
}

/// Outcome of appending one file to an existing record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Stored {
        action: FileAction,
        eviction: EvictionReport,
    },
    /// The record already had an entry for the path; nothing was written
    AlreadyPresent,
}

impl AppendOutcome {
    pub fn was_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// Outcome of a store
#[derive(Debug, Clone)]
pub struct StoreReceipt {
    pub id: SnapshotId,
    pub kind: RecordKind,
    pub base_id: Option<SnapshotId>,
    pub created: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Accounting bytes the store added
    pub bytes_added: u64,
    pub eviction: EvictionReport,
}
