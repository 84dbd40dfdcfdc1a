//! Snapshot creation and file backup

use super::types::{BackupReport, ManagerState, SnapshotManager};
use crate::error::{RewindError, RewindResult, UnifiedError};
use crate::storage::{AppendOutcome, SnapshotPayload};
use crate::tracking::Probe;
use crate::types::{GitSnapshotRef, Snapshot, SnapshotId, SnapshotMetadata, SnapshotMode};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Pre-mutation state of one path
enum Captured {
    Absent,
    /// Content the change detector already knows; bytes are read only if no
    /// stored snapshot holds them
    Known { checksum: String },
    Bytes(Vec<u8>),
}

impl SnapshotManager {
    /// Create a snapshot before an instruction runs
    ///
    /// An active snapshot that has not backed up any file yet is reused
    /// instead, with its instruction and timestamp replaced.
    pub async fn create_snapshot(&self, instruction: &str) -> RewindResult<Snapshot> {
        let mut state = self.state.lock().await;
        state.git.probe().await;
        let now = Utc::now();

        if let Some(meta) = self.reuse_empty_active(&mut state, instruction, now).await? {
            debug!(snapshot_id = %meta.id, "Reused empty active snapshot");
            self.mirror_metadata(&meta).await;
            return Ok(Snapshot {
                metadata: meta,
                files: BTreeMap::new(),
            });
        }

        let previous_instruction = state
            .active
            .as_ref()
            .and_then(|id| state.index.get(id))
            .map(|meta| meta.instruction.clone());
        let id = state.next_id(self.config.storage.id_strategy, instruction, now);

        let mut git_ref = None;
        if state.git.is_usable() {
            match git_snapshot(&mut state, instruction, previous_instruction.as_deref(), now).await
            {
                Ok(r) => git_ref = Some(r),
                Err(e) => state.git.degrade(&e).await,
            }
        }

        let mut meta = match git_ref {
            Some(git_ref) => SnapshotMetadata::new(id.clone(), instruction).with_git(git_ref),
            None => {
                self.store_file_record(&mut state, &id).await?;
                SnapshotMetadata::new(id.clone(), instruction)
            }
        }
        .with_session(self.session_id.as_str());
        meta.timestamp = now;

        state.index.insert(meta.clone());
        state.active = Some(id.clone());
        info!(
            snapshot_id = %id,
            mode = %meta.mode,
            commit = ?meta.git.as_ref().map(|g| g.commit_hash.as_str()),
            "Created snapshot"
        );

        self.mirror_metadata(&meta).await;
        Ok(Snapshot {
            metadata: meta,
            files: BTreeMap::new(),
        })
    }

    async fn reuse_empty_active(
        &self,
        state: &mut ManagerState,
        instruction: &str,
        now: DateTime<Utc>,
    ) -> RewindResult<Option<SnapshotMetadata>> {
        let Some(active) = state.active.clone() else {
            return Ok(None);
        };
        let Some(meta) = state.index.get(&active) else {
            return Ok(None);
        };
        if meta.file_count() > 0 {
            return Ok(None);
        }
        // A dirty tree means something changed since the commit was taken
        if meta.mode == SnapshotMode::Git
            && !matches!(state.git.uncommitted_paths().await, Ok(paths) if paths.is_empty())
        {
            return Ok(None);
        }

        let meta = state.index.update(&active, |meta| {
            meta.instruction = instruction.to_string();
            meta.timestamp = now;
        })?;
        Ok(Some(meta.clone()))
    }

    async fn store_file_record(
        &self,
        state: &mut ManagerState,
        id: &SnapshotId,
    ) -> RewindResult<()> {
        let payload = SnapshotPayload::new(id.clone());
        let receipt = match state.store.latest_id() {
            Some(base) => state.store.store_differential(payload, &base)?,
            None => state.store.store(payload)?,
        };
        let evicted = state.forget_evicted(&receipt.eviction);
        self.unmirror(&evicted).await;
        Ok(())
    }

    /// Record a path's current content in the active snapshot
    ///
    /// Returns `false` when the active snapshot already tracks the path. Must
    /// complete before the caller mutates the file.
    pub async fn backup_file_if_needed(&self, path: impl AsRef<Path>) -> RewindResult<bool> {
        let relative = self.relative_path(path.as_ref())?;
        let mut state = self.state.lock().await;
        let (active, mode) = backup_target(&state)?;
        if state
            .index
            .get(&active)
            .is_some_and(|meta| meta.tracks(&relative))
        {
            return Ok(false);
        }

        let captured = self.capture(&relative, mode).await?;
        self.record_capture(&mut state, &active, mode, relative, captured)
            .await?;
        Ok(true)
    }

    /// Back up many paths, hashing and reading at most
    /// `tracking.max_concurrent_io` files at once
    ///
    /// Per-path failures are collected in the report; only a missing active
    /// snapshot fails the whole call.
    pub async fn backup_files_if_needed<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> RewindResult<BackupReport> {
        let mut report = BackupReport::default();
        let mut pending: Vec<PathBuf> = Vec::new();
        for path in paths {
            match self.relative_path(path.as_ref()) {
                Ok(relative) if !pending.contains(&relative) => pending.push(relative),
                Ok(_) => {}
                Err(e) => report
                    .failed
                    .push((path.as_ref().to_path_buf(), e.to_string())),
            }
        }

        let mut state = self.state.lock().await;
        let (active, mode) = backup_target(&state)?;
        if let Some(meta) = state.index.get(&active) {
            pending.retain(|relative| {
                let tracked = meta.tracks(relative);
                if tracked {
                    report.skipped.push(relative.clone());
                }
                !tracked
            });
        }

        let mut captured: Vec<(PathBuf, RewindResult<Captured>)> = futures::stream::iter(pending)
            .map(|relative| async move {
                let captured = self.capture(&relative, mode).await;
                (relative, captured)
            })
            .buffer_unordered(self.config.tracking.max_concurrent_io)
            .collect()
            .await;
        captured.sort_by(|a, b| a.0.cmp(&b.0));

        for (relative, captured) in captured {
            let result = match captured {
                Ok(captured) => {
                    self.record_capture(&mut state, &active, mode, relative.clone(), captured)
                        .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => report.backed_up.push(relative),
                Err(e) => {
                    warn!(
                        path = %relative.display(),
                        code = e.error_code(),
                        error = %e,
                        "Backup failed"
                    );
                    report.failed.push((relative, e.to_string()));
                }
            }
        }

        debug!(
            snapshot_id = %active,
            backed_up = report.backed_up.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Batch backup finished"
        );
        Ok(report)
    }

    async fn capture(&self, relative: &Path, mode: SnapshotMode) -> RewindResult<Captured> {
        let absolute = self.absolute_path(relative);
        let captured = match (self.detector.probe(&absolute).await?, mode) {
            (Probe::Missing { .. }, _) => Captured::Absent,
            (Probe::Unchanged { checksum, .. }, _)
            | (Probe::Changed { checksum, .. }, SnapshotMode::Git) => Captured::Known { checksum },
            (Probe::Changed { .. }, SnapshotMode::File) => {
                match read_content(&absolute).await? {
                    Some(bytes) => Captured::Bytes(bytes),
                    None => Captured::Absent,
                }
            }
        };
        Ok(captured)
    }

    async fn record_capture(
        &self,
        state: &mut ManagerState,
        active: &SnapshotId,
        mode: SnapshotMode,
        relative: PathBuf,
        captured: Captured,
    ) -> RewindResult<()> {
        let checksum = match mode {
            // Git holds the content; only the path and checksum are recorded
            SnapshotMode::Git => match captured {
                Captured::Absent => None,
                Captured::Known { checksum } => Some(checksum),
                Captured::Bytes(bytes) => Some(self.config.storage.checksum.digest_bytes(&bytes)),
            },
            SnapshotMode::File => {
                self.append_captured(state, active, &relative, captured)
                    .await?
            }
        };

        state.index.update(active, |meta| {
            meta.modified_files.insert(relative.clone());
            if let Some(checksum) = &checksum {
                meta.file_checksums.insert(relative.clone(), checksum.clone());
            }
        })?;
        debug!(snapshot_id = %active, path = %relative.display(), "Backed up file");

        if let Some(meta) = state.index.get(active) {
            self.mirror_metadata(meta).await;
        }
        Ok(())
    }

    /// Append to the active record; returns the stored checksum
    async fn append_captured(
        &self,
        state: &mut ManagerState,
        active: &SnapshotId,
        relative: &Path,
        captured: Captured,
    ) -> RewindResult<Option<String>> {
        let content = match captured {
            Captured::Absent => None,
            Captured::Known { checksum } => {
                if state.store.append_reference(active, relative, &checksum)? {
                    return Ok(Some(checksum));
                }
                read_content(&self.absolute_path(relative)).await?
            }
            Captured::Bytes(bytes) => Some(bytes),
        };

        let mirrored = self.mirror.as_ref().and_then(|_| content.clone());
        let outcome = state.store.append_file(active, relative, content)?;
        if let AppendOutcome::Stored { eviction, .. } = &outcome {
            let evicted = state.forget_evicted(eviction);
            self.unmirror(&evicted).await;
        }

        let checksum = state
            .store
            .get(active)
            .and_then(|record| record.entries.get(relative))
            .and_then(|entry| entry.checksum.clone());
        if let (Some(checksum), Some(bytes)) = (&checksum, mirrored) {
            self.mirror_blob(checksum, &bytes).await;
        }
        Ok(checksum)
    }
}

/// Feature branch plus a commit holding everything done so far
async fn git_snapshot(
    state: &mut ManagerState,
    instruction: &str,
    previous_instruction: Option<&str>,
    now: DateTime<Utc>,
) -> RewindResult<GitSnapshotRef> {
    let branch_name = state.git.open_feature_branch(instruction, now).await?;
    // Pending changes belong to the instruction that made them
    let message_instruction = previous_instruction.unwrap_or(instruction);
    if let Some(hash) = state.git.commit_pending(message_instruction, now).await? {
        debug!(commit = %hash, "Committed pending changes before snapshot");
    }
    let commit_hash = state.git.head_commit().await?;
    Ok(GitSnapshotRef {
        commit_hash,
        branch_name,
    })
}

fn backup_target(state: &ManagerState) -> RewindResult<(SnapshotId, SnapshotMode)> {
    let active = state.active.clone().ok_or_else(|| {
        RewindError::validation("No active snapshot; create a snapshot before backing up files")
    })?;
    let mode = state
        .index
        .get(&active)
        .map(|meta| meta.mode)
        .ok_or_else(|| {
            RewindError::not_found_resource(format!("Snapshot {} not found", active), "snapshot")
        })?;
    Ok((active, mode))
}

/// File bytes, or `None` if the path does not exist
pub(super) async fn read_content(path: &Path) -> RewindResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RewindError::io_with_path(
            format!("Failed to read file: {}", e),
            path.display().to_string(),
        )),
    }
}
