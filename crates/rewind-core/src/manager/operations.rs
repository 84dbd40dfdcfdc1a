//! Lookup, listing and housekeeping operations

use super::types::SnapshotManager;
use crate::error::{RewindError, RewindResult};
use crate::git::{GitLogEntry, GitSessionState};
use crate::metadata::SnapshotQuery;
use crate::storage::{CapacityState, EvictionReport};
use crate::types::{
    ListOptions, Snapshot, SnapshotId, SnapshotMetadata, SnapshotMode, SnapshotSummary,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

impl SnapshotManager {
    /// Resolve a full id or a unique id prefix
    pub async fn resolve_snapshot_id(&self, id_or_prefix: &str) -> RewindResult<SnapshotId> {
        self.state.lock().await.resolve(id_or_prefix)
    }

    /// Get a snapshot with its backed-up content
    ///
    /// Git-mode snapshots carry no content; their files live in the commit.
    /// Paths whose content was dropped by eviction are left out.
    pub async fn get_snapshot(&self, id_or_prefix: &str) -> RewindResult<Snapshot> {
        let state = self.state.lock().await;
        let id = state.resolve(id_or_prefix)?;
        let metadata = state.index.get(&id).cloned().ok_or_else(|| {
            RewindError::not_found_resource(format!("Snapshot {} not found", id), "snapshot")
        })?;

        let mut files = BTreeMap::new();
        if metadata.mode == SnapshotMode::File {
            let reconstructed = state.store.reconstruct(&id)?;
            for path in &metadata.modified_files {
                if !reconstructed.is_lost(path) {
                    files.insert(path.clone(), reconstructed.get(path).map(<[u8]>::to_vec));
                }
            }
        }
        Ok(Snapshot { metadata, files })
    }

    /// Snapshot currently receiving backups
    pub async fn active_snapshot(&self) -> Option<SnapshotMetadata> {
        let state = self.state.lock().await;
        state
            .active
            .as_ref()
            .and_then(|id| state.index.get(id))
            .cloned()
    }

    /// List snapshots
    ///
    /// While a feature branch is open, commits on it that no snapshot
    /// recorded are listed too, keyed by commit hash.
    pub async fn list_snapshots(&self, options: ListOptions) -> RewindResult<Vec<SnapshotSummary>> {
        let state = self.state.lock().await;
        let mut summaries: Vec<SnapshotSummary> = state
            .index
            .newest_first()
            .into_iter()
            .map(SnapshotSummary::from)
            .collect();

        if state.git.state() == GitSessionState::FeatureBranchActive {
            match state.git.session_log(self.config.git.log_limit).await {
                Ok(entries) => {
                    summaries.extend(
                        entries
                            .into_iter()
                            .filter(|entry| state.index.by_commit(&entry.hash).is_none())
                            .map(commit_summary),
                    );
                    summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read git history for listing");
                }
            }
        }

        Ok(options.apply(summaries))
    }

    /// Search snapshot metadata
    pub async fn search_snapshots(&self, query: &SnapshotQuery) -> Vec<SnapshotSummary> {
        let state = self.state.lock().await;
        state
            .index
            .search(query)
            .into_iter()
            .map(SnapshotSummary::from)
            .collect()
    }

    /// Attach a tag to a snapshot
    pub async fn tag_snapshot(&self, id_or_prefix: &str, tag: &str) -> RewindResult<()> {
        let tag = tag.trim();
        if tag.is_empty() || tag.chars().any(char::is_whitespace) {
            return Err(RewindError::validation_field(
                format!("Invalid tag '{}'", tag),
                "tag",
            ));
        }

        let mut state = self.state.lock().await;
        let id = state.resolve(id_or_prefix)?;
        let meta = state.index.update(&id, |meta| {
            if !meta.tags.iter().any(|t| t == tag) {
                meta.tags.push(tag.to_string());
            }
        })?;
        self.mirror_metadata(meta).await;
        Ok(())
    }

    /// Delete a file-mode snapshot
    ///
    /// Later snapshots built on it are rebased and references to its content
    /// repaired; the report lists references that could not be. Git-mode
    /// snapshots are commits and cannot be deleted.
    pub async fn delete_snapshot(&self, id_or_prefix: &str) -> RewindResult<EvictionReport> {
        let mut state = self.state.lock().await;
        let id = state.resolve(id_or_prefix)?;
        if state
            .index
            .get(&id)
            .is_some_and(|meta| meta.mode == SnapshotMode::Git)
        {
            return Err(RewindError::validation_field(
                format!("Snapshot {} is a git commit and cannot be deleted", id),
                "mode",
            ));
        }

        let report = state.store.remove(&id)?;
        state.forget_evicted(&report);
        self.unmirror(&report.evicted).await;

        tracing::info!(
            snapshot_id = %id,
            lost_references = report.warnings.len(),
            "Deleted snapshot"
        );
        Ok(report)
    }

    /// Whether each path changed since it was last seen
    ///
    /// Unreadable paths count as changed.
    pub async fn changed_files(&self, paths: &[PathBuf]) -> RewindResult<BTreeMap<PathBuf, bool>> {
        let mut relative_of: HashMap<PathBuf, PathBuf> = HashMap::new();
        for path in paths {
            let relative = self.relative_path(path)?;
            relative_of.insert(self.absolute_path(&relative), relative);
        }
        let absolute: Vec<PathBuf> = relative_of.keys().cloned().collect();

        let changed = self.detector.check_files(&absolute).await;
        Ok(changed
            .into_iter()
            .filter_map(|(path, changed)| relative_of.remove(&path).map(|rel| (rel, changed)))
            .collect())
    }

    /// Storage usage against limits
    pub async fn capacity(&self) -> CapacityState {
        self.state.lock().await.store.stats()
    }
}

fn commit_summary(entry: GitLogEntry) -> SnapshotSummary {
    SnapshotSummary {
        id: SnapshotId::from_string(entry.hash.clone()),
        instruction: entry.subject,
        timestamp: entry.timestamp,
        mode: SnapshotMode::Git,
        file_count: 0,
        tags: Vec::new(),
        commit: Some(entry.hash),
    }
}
