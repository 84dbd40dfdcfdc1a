//! Rewind Core Library
//!
//! Snapshot and rollback engine for AI-driven code edits: snapshots are taken
//! before an instruction mutates the project and can be restored, listed and
//! searched afterwards. Snapshots live either as commits on a per-session git
//! feature branch or in a deduplicating in-memory differential store.

pub mod checksum;
pub mod config;
pub mod error;
pub mod git;
pub mod ids;
pub mod manager;
pub mod metadata;
pub mod mirror;
pub mod monitor;
pub mod storage;
pub mod tracking;
pub mod types;

// Re-export commonly used types
pub use checksum::ChecksumAlgorithm;
pub use config::{
    GitConfig, IdStrategy, MirrorConfig, MonitorConfig, RewindConfig, StorageConfig,
    TrackingConfig, load_config_from_file, load_config_with_env,
};
pub use error::{RewindError, RewindResult, UnifiedError};
pub use git::{GitCli, GitIntegration, GitRunner, GitSessionState, GitStatus};
pub use manager::{BackupReport, SnapshotManager};
pub use metadata::{SnapshotIndex, SnapshotQuery};
pub use mirror::SnapshotMirror;
pub use monitor::{Classification, ToolDescriptor, ToolMonitor, affected_paths};
pub use storage::{CapacityState, DifferentialStore, EvictionReport, ReferenceRepairWarning};
pub use tracking::{ContentChangeDetector, FileVersionTracker};
pub use types::*;
