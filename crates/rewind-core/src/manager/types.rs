//! Snapshot manager types and construction

use crate::config::{IdStrategy, RewindConfig};
use crate::error::{RewindError, RewindResult};
use crate::git::{GitCli, GitIntegration, GitRunner};
use crate::ids::{deterministic_snapshot_id, random_snapshot_id};
use crate::metadata::SnapshotIndex;
use crate::mirror::SnapshotMirror;
use crate::monitor::{ToolDescriptor, ToolMonitor};
use crate::storage::{DifferentialStore, EvictionReport};
use crate::tracking::ContentChangeDetector;
use crate::types::{SnapshotId, SnapshotMetadata};
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Snapshot manager for creating, backing up and restoring snapshots
pub struct SnapshotManager {
    pub(super) config: RewindConfig,
    pub(super) session_id: String,
    pub(super) detector: ContentChangeDetector,
    pub(super) monitor: ToolMonitor,
    pub(super) mirror: Option<SnapshotMirror>,
    /// Held across each public operation
    pub(super) state: Mutex<ManagerState>,
}

pub(super) struct ManagerState {
    pub(super) index: SnapshotIndex,
    pub(super) store: DifferentialStore,
    pub(super) git: GitIntegration,
    /// Snapshot receiving backups
    pub(super) active: Option<SnapshotId>,
    /// Snapshots minted this session, fed into deterministic ids
    pub(super) minted: u64,
}

/// Outcome of a batch backup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    /// Paths recorded by this call
    pub backed_up: Vec<PathBuf>,
    /// Paths the active snapshot already tracked
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BackupReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl SnapshotManager {
    /// Create a manager that runs the configured git binary
    pub fn new(config: RewindConfig) -> RewindResult<Self> {
        let runner = Arc::new(GitCli::from_config(&config.git, &config.project_root));
        Self::with_git_runner(config, runner)
    }

    /// Create with a custom git runner
    pub fn with_git_runner(
        config: RewindConfig,
        runner: Arc<dyn GitRunner>,
    ) -> RewindResult<Self> {
        config.validate()?;

        let detector = ContentChangeDetector::new(
            config.storage.checksum,
            config.tracking.hash_chunk_size,
            config.tracking.max_concurrent_io,
        );
        let mirror = config
            .mirror
            .enabled
            .then(|| SnapshotMirror::from_config(&config.mirror, &config.project_root));
        let state = ManagerState {
            index: SnapshotIndex::new(),
            store: DifferentialStore::from_config(&config.storage),
            git: GitIntegration::new(runner, config.git.clone()),
            active: None,
            minted: 0,
        };

        Ok(Self {
            monitor: ToolMonitor::new(config.monitor.clone()),
            session_id: uuid::Uuid::new_v4().to_string(),
            detector,
            mirror,
            state: Mutex::new(state),
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &RewindConfig {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.config.project_root
    }

    /// Session id stamped on every snapshot this manager creates
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn monitor(&self) -> &ToolMonitor {
        &self.monitor
    }

    /// Check if a tool call should be preceded by a snapshot
    pub fn should_snapshot(&self, descriptor: &ToolDescriptor) -> bool {
        self.monitor.should_snapshot(descriptor)
    }

    // Internal helper methods

    /// Normalize a path to be relative to the project root
    pub(super) fn relative_path(&self, path: &Path) -> RewindResult<PathBuf> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.config.project_root).map_err(|_| {
                RewindError::validation_field(
                    format!("{} is outside the project root", path.display()),
                    "path",
                )
            })?
        } else {
            path
        };

        let mut normalized = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(RewindError::validation_field(
                        format!("{} escapes the project root", path.display()),
                        "path",
                    ));
                }
            }
        }
        if normalized.as_os_str().is_empty() {
            return Err(RewindError::validation_field("Path is empty", "path"));
        }
        Ok(normalized)
    }

    pub(super) fn absolute_path(&self, relative: &Path) -> PathBuf {
        self.config.project_root.join(relative)
    }

    /// Mirror metadata, logging failures
    pub(super) async fn mirror_metadata(&self, meta: &SnapshotMetadata) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        if let Err(e) = mirror.save_snapshot(meta, &Default::default()).await {
            warn!(snapshot_id = %meta.id, error = %e, "Failed to mirror snapshot metadata");
        }
    }

    /// Mirror one content blob, logging failures
    pub(super) async fn mirror_blob(&self, checksum: &str, bytes: &[u8]) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        if let Err(e) = mirror.store_blob(checksum, bytes).await {
            warn!(checksum, error = %e, "Failed to mirror content blob");
        }
    }

    /// Drop mirrored metadata of removed snapshots and the blobs only they
    /// used, logging failures
    pub(super) async fn unmirror(&self, ids: &[SnapshotId]) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        if ids.is_empty() {
            return;
        }
        for id in ids {
            if let Err(e) = mirror.remove_snapshot(id).await {
                warn!(snapshot_id = %id, error = %e, "Failed to remove mirrored snapshot");
            }
        }
        if let Err(e) = mirror.prune_blobs().await {
            warn!(error = %e, "Failed to prune mirrored blobs");
        }
    }
}

impl ManagerState {
    /// Mint an id not used by any live snapshot
    pub(super) fn next_id(
        &mut self,
        strategy: IdStrategy,
        instruction: &str,
        timestamp: DateTime<Utc>,
    ) -> SnapshotId {
        loop {
            self.minted += 1;
            let id = match strategy {
                IdStrategy::Random => random_snapshot_id(),
                IdStrategy::Deterministic => {
                    deterministic_snapshot_id(instruction, timestamp, self.minted)
                }
            };
            if !self.index.contains(&id) {
                return id;
            }
        }
    }

    /// Drop evicted snapshots from the index
    pub(super) fn forget_evicted(&mut self, report: &EvictionReport) -> Vec<SnapshotId> {
        for id in &report.evicted {
            self.index.remove(id);
            if self.active.as_ref() == Some(id) {
                self.active = None;
            }
        }
        report.evicted.clone()
    }

    /// Resolve an exact id or a unique id prefix
    pub(super) fn resolve(&self, id_or_prefix: &str) -> RewindResult<SnapshotId> {
        let needle = id_or_prefix.trim();
        if needle.is_empty() {
            return Err(RewindError::validation_field("Snapshot id is empty", "id"));
        }

        let exact = SnapshotId::from_string(needle);
        if self.index.contains(&exact) {
            return Ok(exact);
        }

        let mut candidates = self.index.ids_with_prefix(needle);
        match candidates.len() {
            0 => Err(RewindError::not_found_resource(
                format!("No snapshot matches '{}'", needle),
                "snapshot",
            )),
            1 => Ok(candidates.remove(0)),
            _ => Err(RewindError::ambiguous_id(
                needle,
                candidates.into_iter().map(|id| id.0).collect(),
            )),
        }
    }
}
