//! Snapshot restore
//!
//! The restore method follows the snapshot's recorded mode: file-mode
//! snapshots are replayed from the storage engine, git-mode snapshots
//! hard-reset to their commit.

use super::core::read_content;
use super::types::{ManagerState, SnapshotManager};
use crate::error::{RewindError, RewindResult};
use crate::types::{
    RestoreOptions, RestorePreview, RestoreResult, SnapshotMetadata, SnapshotMode,
};
use std::path::{Path, PathBuf};
use tokio::fs;

impl SnapshotManager {
    /// Restore files to their state before the snapshot's instruction ran
    ///
    /// With `options.preview` nothing is touched and `result.preview` lists
    /// what would happen per path. File-mode failures are collected per path;
    /// git failures are returned as errors.
    pub async fn restore_snapshot(
        &self,
        id_or_prefix: &str,
        options: RestoreOptions,
    ) -> RewindResult<RestoreResult> {
        let state = self.state.lock().await;
        let id = state.resolve(id_or_prefix)?;
        let meta = state.index.get(&id).cloned().ok_or_else(|| {
            RewindError::not_found_resource(format!("Snapshot {} not found", id), "snapshot")
        })?;

        tracing::info!(
            snapshot_id = %meta.id.short(),
            mode = %meta.mode,
            preview = options.preview,
            "Restoring snapshot"
        );

        let result = match meta.mode {
            SnapshotMode::File => self.restore_from_store(&state, &meta, &options).await?,
            SnapshotMode::Git => self.restore_from_git(&state, &meta, &options).await?,
        };

        tracing::info!(
            restored = result.restored_count(),
            failed = result.failed_count(),
            preview = result.was_preview,
            "Restore complete"
        );
        Ok(result)
    }

    async fn restore_from_store(
        &self,
        state: &ManagerState,
        meta: &SnapshotMetadata,
        options: &RestoreOptions,
    ) -> RewindResult<RestoreResult> {
        let reconstructed = state.store.reconstruct(&meta.id)?;
        let mut result = RestoreResult::new(meta.id.clone(), SnapshotMode::File, options.preview);

        for path in meta.modified_files.iter().filter(|p| options.includes(p)) {
            if reconstructed.is_lost(path) {
                result.failed_files.push((
                    path.clone(),
                    "Content was dropped when its holder snapshot was evicted".to_string(),
                ));
                continue;
            }
            let target = reconstructed.get(path);
            let absolute = self.absolute_path(path);

            if options.preview {
                match preview_path(&absolute, path, target).await {
                    Ok(preview) => {
                        if !matches!(preview, RestorePreview::NoChange(_)) {
                            result.restored_files.push(path.clone());
                        }
                        result.preview.push(preview);
                    }
                    Err(e) => result.failed_files.push((path.clone(), e.to_string())),
                }
                continue;
            }

            match restore_path(&absolute, target).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Restored file");
                    self.detector.forget(&absolute);
                    result.restored_files.push(path.clone());
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to restore file");
                    result.failed_files.push((path.clone(), e.to_string()));
                }
            }
        }

        Ok(result)
    }

    async fn restore_from_git(
        &self,
        state: &ManagerState,
        meta: &SnapshotMetadata,
        options: &RestoreOptions,
    ) -> RewindResult<RestoreResult> {
        let commit = meta
            .git
            .as_ref()
            .map(|g| g.commit_hash.clone())
            .ok_or_else(|| {
                RewindError::storage_with_context(
                    format!("Git snapshot {} has no commit", meta.id),
                    "restore",
                )
            })?;
        if !state.git.commit_exists(&commit).await? {
            return Err(RewindError::not_found_resource(
                format!("Commit {} of snapshot {} no longer exists", commit, meta.id),
                "commit",
            ));
        }

        let mut result = RestoreResult::new(meta.id.clone(), SnapshotMode::Git, options.preview);
        let changes: Vec<(String, PathBuf)> = state
            .git
            .diff_name_status(&commit)
            .await?
            .into_iter()
            .filter(|(_, path)| options.includes(path))
            .collect();
        result.restored_files = changes.iter().map(|(_, path)| path.clone()).collect();

        if options.preview {
            result.preview = changes
                .into_iter()
                .map(|(status, path)| match status.chars().next() {
                    // Added since the commit
                    Some('A') => RestorePreview::WillDelete(path),
                    Some('D') => RestorePreview::WillCreate(path),
                    _ => RestorePreview::WillOverwrite(path),
                })
                .collect();
            return Ok(result);
        }

        if options.file_filter.is_empty() {
            state.git.reset_hard(&commit).await?;
        } else {
            // Paths added since the commit have nothing to check out
            let (added, existing): (Vec<_>, Vec<_>) =
                changes.into_iter().partition(|(status, _)| status.starts_with('A'));
            let existing: Vec<PathBuf> = existing.into_iter().map(|(_, path)| path).collect();
            if !existing.is_empty() {
                state.git.checkout_paths(&commit, &existing).await?;
            }
            for (_, path) in added {
                if let Err(e) = restore_path(&self.absolute_path(&path), None).await {
                    result.failed_files.push((path, e.to_string()));
                }
            }
        }
        for path in &result.restored_files {
            self.detector.forget(&self.absolute_path(path));
        }
        Ok(result)
    }
}

/// Write `target` to `path`, or delete `path` when `target` is `None`
async fn restore_path(path: &Path, target: Option<&[u8]>) -> RewindResult<()> {
    match target {
        Some(content) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    RewindError::io_with_path(
                        format!("Failed to create directory: {}", e),
                        parent.display().to_string(),
                    )
                })?;
            }
            fs::write(path, content).await.map_err(|e| {
                RewindError::io_with_path(
                    format!("Failed to write file: {}", e),
                    path.display().to_string(),
                )
            })
        }
        None => match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RewindError::io_with_path(
                format!("Failed to delete file: {}", e),
                path.display().to_string(),
            )),
        },
    }
}

/// What restoring `target` to `absolute` would do
async fn preview_path(
    absolute: &Path,
    relative: &Path,
    target: Option<&[u8]>,
) -> RewindResult<RestorePreview> {
    let current = read_content(absolute).await?;
    let relative = relative.to_path_buf();
    let preview = match (current, target) {
        (Some(current), Some(target)) if current == target => RestorePreview::NoChange(relative),
        (Some(_), Some(_)) => RestorePreview::WillOverwrite(relative),
        (None, Some(_)) => RestorePreview::WillCreate(relative),
        (Some(_), None) => RestorePreview::WillDelete(relative),
        (None, None) => RestorePreview::NoChange(relative),
    };
    Ok(preview)
}
