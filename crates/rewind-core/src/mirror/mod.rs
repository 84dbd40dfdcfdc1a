//! Best-effort on-disk mirror of file-mode snapshots
//!
//! ```text
//! <data_dir>/
//!   index/index.json        ids of live snapshots
//!   snapshots/{id}.json     snapshot metadata
//!   cache/{checksum}.gz     gzip content blobs, shared across snapshots
//!   temp/                   in-flight writes, renamed into place
//! ```
//!
//! The in-memory store stays authoritative. Callers log and ignore mirror
//! errors.

mod compression;


use crate::config::MirrorConfig;
use crate::error::{RewindError, RewindResult};
use crate::types::{SnapshotId, SnapshotMetadata};
use chrono::{DateTime, Utc};
use compression::{compress_bytes, decompress_bytes};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct MirrorIndex {
    snapshots: Vec<SnapshotId>,
    updated_at: DateTime<Utc>,
}

/// Disk mirror rooted at the configured data directory
#[derive(Debug, Clone)]
pub struct SnapshotMirror {
    root: PathBuf,
    temp_max_age: Duration,
}

impl SnapshotMirror {
    pub fn new(root: impl Into<PathBuf>, temp_max_age: Duration) -> Self {
        Self {
            root: root.into(),
            temp_max_age,
        }
    }

    pub fn from_config(config: &MirrorConfig, project_root: &Path) -> Self {
        Self::new(config.resolve_dir(project_root), config.temp_max_age)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index").join("index.json")
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    fn snapshot_path(&self, id: &SnapshotId) -> RewindResult<PathBuf> {
        let safe = !id.as_str().is_empty()
            && id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(RewindError::validation_field(
                format!("Snapshot id '{}' cannot be used as a file name", id),
                "id",
            ));
        }
        Ok(self.snapshots_dir().join(format!("{}.json", id.as_str())))
    }

    fn blob_path(&self, checksum: &str) -> RewindResult<PathBuf> {
        if checksum.is_empty() || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RewindError::validation_field(
                format!("Invalid blob checksum '{}'", checksum),
                "checksum",
            ));
        }
        Ok(self.cache_dir().join(format!("{}.gz", checksum)))
    }

    /// Create the directory layout
    pub async fn ensure_dirs(&self) -> RewindResult<()> {
        for dir in [
            self.root.join("index"),
            self.snapshots_dir(),
            self.cache_dir(),
            self.temp_dir(),
        ] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                RewindError::io_with_path(
                    format!("Failed to create mirror directory: {}", e),
                    dir.display().to_string(),
                )
            })?;
        }
        Ok(())
    }

    /// Write through a temp file and rename into place
    async fn write_atomic(&self, target: &Path, bytes: &[u8]) -> RewindResult<()> {
        let temp = self
            .temp_dir()
            .join(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&temp, bytes).await.map_err(|e| {
            RewindError::io_with_path(
                format!("Failed to write temp file: {}", e),
                temp.display().to_string(),
            )
        })?;
        if let Err(e) = fs::rename(&temp, target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(RewindError::io_with_path(
                format!("Failed to move file into place: {}", e),
                target.display().to_string(),
            ));
        }
        Ok(())
    }

    /// Persist metadata and any content blobs not already on disk
    pub async fn save_snapshot(
        &self,
        meta: &SnapshotMetadata,
        files: &BTreeMap<PathBuf, Option<Vec<u8>>>,
    ) -> RewindResult<()> {
        self.ensure_dirs().await?;

        let mut written = 0usize;
        for (path, content) in files {
            let (Some(bytes), Some(checksum)) = (content, meta.file_checksums.get(path)) else {
                continue;
            };
            if self.store_blob(checksum, bytes).await? {
                written += 1;
            }
        }

        let json = serde_json::to_vec_pretty(meta)?;
        let target = self.snapshot_path(&meta.id)?;
        self.write_atomic(&target, &json).await?;
        debug!(snapshot_id = %meta.id, blobs = written, "Mirrored snapshot");
        Ok(())
    }

    /// Store a blob unless present; returns whether it was written
    pub async fn store_blob(&self, checksum: &str, bytes: &[u8]) -> RewindResult<bool> {
        let target = self.blob_path(checksum)?;
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(false);
        }
        let compressed = compress_bytes(bytes)?;
        self.write_atomic(&target, &compressed).await?;
        Ok(true)
    }

    pub async fn load_blob(&self, checksum: &str) -> RewindResult<Option<Vec<u8>>> {
        let path = self.blob_path(checksum)?;
        match fs::read(&path).await {
            Ok(compressed) => decompress_bytes(&compressed).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RewindError::io_with_path(
                format!("Failed to read blob: {}", e),
                path.display().to_string(),
            )),
        }
    }

    pub async fn load_snapshot(&self, id: &SnapshotId) -> RewindResult<Option<SnapshotMetadata>> {
        let path = self.snapshot_path(id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RewindError::io_with_path(
                format!("Failed to read snapshot metadata: {}", e),
                path.display().to_string(),
            )),
        }
    }

    /// Remove a snapshot's metadata; blobs are left to [`prune_blobs`](Self::prune_blobs)
    pub async fn remove_snapshot(&self, id: &SnapshotId) -> RewindResult<()> {
        let path = self.snapshot_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RewindError::io_with_path(
                format!("Failed to remove snapshot metadata: {}", e),
                path.display().to_string(),
            )),
        }
    }

    /// Delete cached blobs that no mirrored snapshot references
    ///
    /// Metadata files that fail to parse are skipped, so their blobs may be
    /// pruned too. Returns the number of blobs removed.
    pub async fn prune_blobs(&self) -> RewindResult<usize> {
        let Some(mut snapshots) = read_dir_if_present(&self.snapshots_dir()).await? else {
            return Ok(0);
        };
        let mut live: HashSet<String> = HashSet::new();
        while let Some(entry) = snapshots.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let parsed = fs::read(&path)
                .await
                .ok()
                .and_then(|bytes| serde_json::from_slice::<SnapshotMetadata>(&bytes).ok());
            match parsed {
                Some(meta) => live.extend(meta.file_checksums.into_values()),
                None => debug!(path = %path.display(), "Skipping unreadable mirrored metadata"),
            }
        }

        let Some(mut blobs) = read_dir_if_present(&self.cache_dir()).await? else {
            return Ok(0);
        };
        let mut removed = 0;
        while let Some(entry) = blobs.next_entry().await? {
            let path = entry.path();
            let Some(checksum) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix(".gz"))
            else {
                continue;
            };
            if !live.contains(checksum) {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "Pruned unreferenced mirror blobs");
        }
        Ok(removed)
    }

    /// Replace the index with `ids`
    pub async fn write_index(&self, ids: &[SnapshotId]) -> RewindResult<()> {
        self.ensure_dirs().await?;
        let index = MirrorIndex {
            snapshots: ids.to_vec(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&index)?;
        self.write_atomic(&self.index_path(), &json).await
    }

    /// Ids in the index, empty if there is none yet
    pub async fn read_index(&self) -> RewindResult<Vec<SnapshotId>> {
        match fs::read(self.index_path()).await {
            Ok(bytes) => Ok(serde_json::from_slice::<MirrorIndex>(&bytes)?.snapshots),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(RewindError::io(format!("Failed to read mirror index: {}", e))),
        }
    }

    /// Delete temp files older than the configured age
    pub async fn sweep_temp(&self) -> RewindResult<usize> {
        let dir = self.temp_dir();
        let Some(mut entries) = read_dir_if_present(&dir).await? else {
            return Ok(0);
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if metadata.is_file() && age >= self.temp_max_age {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, dir = %dir.display(), "Swept stale temp files");
        }
        Ok(removed)
    }
}

async fn read_dir_if_present(dir: &Path) -> RewindResult<Option<fs::ReadDir>> {
    match fs::read_dir(dir).await {
        Ok(entries) => Ok(Some(entries)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RewindError::io_with_path(
            format!("Failed to read mirror directory: {}", e),
            dir.display().to_string(),
        )),
    }
}
