//! Snapshot type definitions
//!
//! A snapshot is the pre-mutation state of the files an instruction touched.
//! Metadata and content are kept apart: [`SnapshotMetadata`] lives in the
//! metadata index, content lives in the storage engine, and [`Snapshot`] is
//! the materialized join handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Unique identifier for a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    /// Create from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage strategy a snapshot was created under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    /// Content held by the in-memory storage engine
    File,
    /// State held by a git commit on the feature branch
    Git,
}

impl std::fmt::Display for SnapshotMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Git => write!(f, "git"),
        }
    }
}

/// Git coordinates of a git-mode snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSnapshotRef {
    /// Commit the snapshot restores to
    pub commit_hash: String,
    /// Feature branch the commit lives on
    pub branch_name: String,
}

/// Everything about a snapshot except file content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: SnapshotId,
    /// Instruction that triggered the snapshot
    pub instruction: String,
    pub timestamp: DateTime<Utc>,
    /// Fixed at creation
    pub mode: SnapshotMode,
    /// Paths backed up under this snapshot
    pub modified_files: BTreeSet<PathBuf>,
    /// Checksums of backed-up content (absent paths have no entry)
    pub file_checksums: BTreeMap<PathBuf, String>,
    /// Present iff `mode == Git`
    pub git: Option<GitSnapshotRef>,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    pub author: Option<String>,
}

impl SnapshotMetadata {
    /// Create metadata for a new file-mode snapshot
    pub fn new(id: SnapshotId, instruction: impl Into<String>) -> Self {
        Self {
            id,
            instruction: instruction.into(),
            timestamp: Utc::now(),
            mode: SnapshotMode::File,
            modified_files: BTreeSet::new(),
            file_checksums: BTreeMap::new(),
            git: None,
            tags: Vec::new(),
            session_id: None,
            author: None,
        }
    }

    /// Switch to git mode with the given coordinates
    pub fn with_git(mut self, git: GitSnapshotRef) -> Self {
        self.mode = SnapshotMode::Git;
        self.git = Some(git);
        self
    }

    /// Set session id
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Number of tracked paths
    pub fn file_count(&self) -> usize {
        self.modified_files.len()
    }

    /// Whether a path was already backed up
    pub fn tracks(&self, path: &Path) -> bool {
        self.modified_files.contains(path)
    }
}

/// Materialized snapshot: metadata plus backed-up content
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    /// Path -> content before mutation; `None` means the path did not exist
    pub files: BTreeMap<PathBuf, Option<Vec<u8>>>,
}

impl Snapshot {
    pub fn id(&self) -> &SnapshotId {
        &self.metadata.id
    }

    pub fn mode(&self) -> SnapshotMode {
        self.metadata.mode
    }

    pub fn instruction(&self) -> &str {
        &self.metadata.instruction
    }

    /// Content of a path as text, if it existed and is UTF-8
    pub fn file_text(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.files
            .get(path.as_ref())
            .and_then(|c| c.as_deref())
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// Summary of a snapshot for listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub instruction: String,
    pub timestamp: DateTime<Utc>,
    pub mode: SnapshotMode,
    pub file_count: usize,
    pub tags: Vec<String>,
    /// Commit hash for git-mode entries
    pub commit: Option<String>,
}

impl From<&SnapshotMetadata> for SnapshotSummary {
    fn from(meta: &SnapshotMetadata) -> Self {
        Self {
            id: meta.id.clone(),
            instruction: meta.instruction.clone(),
            timestamp: meta.timestamp,
            mode: meta.mode,
            file_count: meta.modified_files.len(),
            tags: meta.tags.clone(),
            commit: meta.git.as_ref().map(|g| g.commit_hash.clone()),
        }
    }
}

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Sorting and paging for `list_snapshots`
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub sort: SortOrder,
    pub offset: usize,
    /// `None` = no limit
    pub limit: Option<usize>,
}

impl ListOptions {
    /// Newest first, no paging
    pub fn all() -> Self {
        Self::default()
    }

    /// Set sort order
    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Set page window
    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Apply the options to an already-sorted newest-first list
    pub(crate) fn apply<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if self.sort == SortOrder::OldestFirst {
            items.reverse();
        }
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// Restore options
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Report what would change without touching anything
    pub preview: bool,
    /// Specific files to restore (empty = all)
    pub file_filter: Vec<PathBuf>,
}

impl RestoreOptions {
    /// Restore everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Preview only
    pub fn preview() -> Self {
        Self {
            preview: true,
            ..Self::default()
        }
    }

    /// Add file filter
    pub fn with_files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.file_filter.extend(files);
        self
    }

    pub(crate) fn includes(&self, path: &Path) -> bool {
        self.file_filter.is_empty() || self.file_filter.iter().any(|p| p == path)
    }
}

/// Preview of what will happen to one path during restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestorePreview {
    /// File will be created
    WillCreate(PathBuf),
    /// File will be overwritten
    WillOverwrite(PathBuf),
    /// File will be deleted
    WillDelete(PathBuf),
    /// Current content already matches
    NoChange(PathBuf),
}

impl RestorePreview {
    /// Get the path
    pub fn path(&self) -> &Path {
        match self {
            Self::WillCreate(p) | Self::WillOverwrite(p) | Self::WillDelete(p) | Self::NoChange(p) => p,
        }
    }
}

/// Result of a restore operation
#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub snapshot_id: SnapshotId,
    /// Mode the snapshot was restored with (its own recorded mode)
    pub mode: SnapshotMode,
    /// Files that were restored (or would be, in preview)
    pub restored_files: Vec<PathBuf>,
    /// Files that failed to restore
    pub failed_files: Vec<(PathBuf, String)>,
    /// Per-path preview, filled only in preview mode
    pub preview: Vec<RestorePreview>,
    pub was_preview: bool,
}

impl RestoreResult {
    pub(crate) fn new(snapshot_id: SnapshotId, mode: SnapshotMode, was_preview: bool) -> Self {
        Self {
            snapshot_id,
            mode,
            restored_files: Vec::new(),
            failed_files: Vec::new(),
            preview: Vec::new(),
            was_preview,
        }
    }

    /// Check if restore was successful
    pub fn is_success(&self) -> bool {
        self.failed_files.is_empty()
    }

    /// Get count of restored files
    pub fn restored_count(&self) -> usize {
        self.restored_files.len()
    }

    /// Get count of failed files
    pub fn failed_count(&self) -> usize {
        self.failed_files.len()
    }
}
