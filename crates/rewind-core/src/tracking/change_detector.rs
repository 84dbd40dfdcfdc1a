//! Stat + hash cache for deciding whether a file changed

use crate::checksum::{ChecksumAlgorithm, digest_file};
use crate::error::{RewindError, RewindResult};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// A file modified this close to when it was hashed may change again within
/// the same mtime tick, so its fingerprint is not trusted
const RACY_WINDOW: Duration = Duration::from_secs(2);

/// Cached identity of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub checksum: String,
    /// When the checksum was computed
    pub observed_at: SystemTime,
}

impl FileFingerprint {
    /// Whether size and mtime alone prove the content is unchanged
    fn vouches_for(&self, size: u64, modified: Option<SystemTime>) -> bool {
        let Some(mtime) = self.modified else {
            return false;
        };
        let settled = self
            .observed_at
            .duration_since(mtime)
            .is_ok_and(|age| age >= RACY_WINDOW);
        self.size == size && modified == Some(mtime) && settled
    }
}

/// Outcome of probing a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Path does not exist; `was_tracked` if it existed at the last probe
    Missing { was_tracked: bool },
    /// Same content as the last probe
    Unchanged { checksum: String, size: u64 },
    /// New or different content
    Changed { checksum: String, size: u64 },
}

impl Probe {
    /// Deletion counts as a change only for previously tracked paths
    pub fn is_changed(&self) -> bool {
        match self {
            Self::Missing { was_tracked } => *was_tracked,
            Self::Unchanged { .. } => false,
            Self::Changed { .. } => true,
        }
    }
}

/// File change detector
///
/// Compares cached size and mtime first and only re-hashes on mismatch,
/// first sight, or when the file was modified too close to its last hash.
pub struct ContentChangeDetector {
    algorithm: ChecksumAlgorithm,
    chunk_size: usize,
    max_concurrency: usize,
    cache: Mutex<HashMap<PathBuf, FileFingerprint>>,
}

impl ContentChangeDetector {
    /// Create a new change detector
    pub fn new(algorithm: ChecksumAlgorithm, chunk_size: usize, max_concurrency: usize) -> Self {
        Self {
            algorithm,
            chunk_size,
            max_concurrency: max_concurrency.max(1),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Probe a path and refresh the cache
    pub async fn probe(&self, path: &Path) -> RewindResult<Probe> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let was_tracked = self.cache.lock().remove(path).is_some();
                return Ok(Probe::Missing { was_tracked });
            }
            Err(e) => {
                return Err(RewindError::io_with_path(
                    format!("Failed to stat file: {}", e),
                    path.display().to_string(),
                ));
            }
        };

        if metadata.is_dir() {
            return Err(RewindError::validation_field(
                format!("{} is a directory", path.display()),
                "path",
            ));
        }

        let size = metadata.len();
        let modified = metadata.modified().ok();

        let cached = self.cache.lock().get(path).cloned();
        if let Some(cached) = &cached {
            if cached.vouches_for(size, modified) {
                return Ok(Probe::Unchanged {
                    checksum: cached.checksum.clone(),
                    size,
                });
            }
        }

        let observed_at = SystemTime::now();

        let (checksum, hashed_size) = digest_file(path, self.algorithm, self.chunk_size).await?;
        let changed = cached.map_or(true, |c| c.checksum != checksum);

        self.cache.lock().insert(
            path.to_path_buf(),
            FileFingerprint {
                size: hashed_size,
                modified,
                checksum: checksum.clone(),
                observed_at,
            },
        );

        tracing::trace!(path = %path.display(), changed, "Probed file");

        if changed {
            Ok(Probe::Changed {
                checksum,
                size: hashed_size,
            })
        } else {
            Ok(Probe::Unchanged {
                checksum,
                size: hashed_size,
            })
        }
    }

    /// Whether a file changed since it was last seen
    pub async fn has_file_changed(&self, path: &Path) -> RewindResult<bool> {
        Ok(self.probe(path).await?.is_changed())
    }

    /// Check many files with bounded concurrency
    ///
    /// Per-file errors do not abort the batch; an unreadable file is
    /// reported as changed.
    pub async fn check_files(&self, paths: &[PathBuf]) -> BTreeMap<PathBuf, bool> {
        futures::stream::iter(paths.iter().cloned())
            .map(|path| async move {
                let changed = match self.has_file_changed(&path).await {
                    Ok(changed) => changed,
                    Err(e) => {
                        tracing::debug!(
                            path = %path.display(),
                            error = %e,
                            "Change check failed, treating as changed"
                        );
                        true
                    }
                };
                (path, changed)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await
    }

    /// Cached fingerprint for a path
    pub fn fingerprint(&self, path: &Path) -> Option<FileFingerprint> {
        self.cache.lock().get(path).cloned()
    }

    /// Forget a path
    pub fn forget(&self, path: &Path) {
        self.cache.lock().remove(path);
    }

    /// Drop every cached fingerprint (e.g. after a restore rewrote files)
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Number of cached paths
    pub fn tracked_count(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }
}
