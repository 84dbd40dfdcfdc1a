//! Configuration sections

use crate::checksum::ChecksumAlgorithm;
use crate::error::{RewindError, RewindResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    /// Project root directory; relative snapshot paths resolve against it
    pub project_root: PathBuf,
    /// Storage engine limits and hashing
    pub storage: StorageConfig,
    /// Change detection and batch I/O
    pub tracking: TrackingConfig,
    /// Git integration
    pub git: GitConfig,
    /// Tool classification policy
    pub monitor: MonitorConfig,
    /// Optional on-disk mirror
    pub mirror: MirrorConfig,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            storage: StorageConfig::default(),
            tracking: TrackingConfig::default(),
            git: GitConfig::default(),
            monitor: MonitorConfig::default(),
            mirror: MirrorConfig::default(),
        }
    }
}

impl RewindConfig {
    /// Create config rooted at a project directory
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Default::default()
        }
    }

    /// Set max snapshots
    pub fn with_max_snapshots(mut self, max: usize) -> Self {
        self.storage.max_snapshots = max;
        self
    }

    /// Set memory limit in bytes
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.storage.memory_limit_bytes = bytes;
        self
    }

    /// Set checksum algorithm
    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.storage.checksum = algorithm;
        self
    }

    /// Disable git integration entirely
    pub fn without_git(mut self) -> Self {
        self.git.enabled = false;
        self
    }

    /// Enable the on-disk mirror
    pub fn with_mirror(mut self) -> Self {
        self.mirror.enabled = true;
        self
    }

    /// Parse from a TOML document
    pub fn from_toml_str(content: &str) -> RewindResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> RewindResult<()> {
        if self.storage.max_snapshots == 0 {
            return Err(RewindError::config("storage.max_snapshots must be at least 1"));
        }
        if self.storage.memory_limit_bytes == 0 {
            return Err(RewindError::config("storage.memory_limit_bytes must be positive"));
        }
        if self.tracking.max_concurrent_io == 0 {
            return Err(RewindError::config("tracking.max_concurrent_io must be at least 1"));
        }
        if self.tracking.hash_chunk_size < 1024 {
            return Err(RewindError::config("tracking.hash_chunk_size must be at least 1024"));
        }
        if !(0.0..=1.0).contains(&self.monitor.confidence_threshold) {
            return Err(RewindError::config(
                "monitor.confidence_threshold must be within 0.0..=1.0",
            ));
        }
        if self.git.command_timeout.is_zero() {
            return Err(RewindError::config("git.command_timeout must be positive"));
        }
        if !crate::ids::is_valid_branch_name(&self.git.branch_prefix) {
            return Err(RewindError::config(format!(
                "git.branch_prefix '{}' is not a valid branch name component",
                self.git.branch_prefix
            )));
        }
        Ok(())
    }
}

/// How new snapshot ids are minted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Random UUID-derived ids
    #[default]
    Random,
    /// Checksum of instruction, timestamp and sequence number
    Deterministic,
}

/// Storage engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Maximum number of snapshots kept in memory
    pub max_snapshots: usize,
    /// Memory limit for stored content and entry metadata
    pub memory_limit_bytes: u64,
    /// Content digest used for dedup
    pub checksum: ChecksumAlgorithm,
    /// Snapshot id generation
    pub id_strategy: IdStrategy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_snapshots: 50,
            memory_limit_bytes: 100 * 1024 * 1024, // 100MB
            checksum: ChecksumAlgorithm::Md5,
            id_strategy: IdStrategy::Random,
        }
    }
}

/// Change detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Fan-out cap for batch hashing and backup
    pub max_concurrent_io: usize,
    /// Read buffer size for streamed hashing
    pub hash_chunk_size: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_io: 8,
            hash_chunk_size: 64 * 1024,
        }
    }
}

/// Git integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Use git when the project is a repository
    pub enabled: bool,
    /// Git executable
    pub binary: String,
    /// Feature branch prefix (`<prefix>/<timestamp>-<slug>`)
    pub branch_prefix: String,
    /// Timeout applied to every git subprocess
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
    /// Maximum commits replayed when listing git snapshots
    pub log_limit: usize,
    /// Delete a clean feature branch on shutdown
    pub auto_cleanup: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "git".to_string(),
            branch_prefix: "rewind".to_string(),
            command_timeout: Duration::from_secs(30),
            log_limit: 100,
            auto_cleanup: false,
        }
    }
}

/// Tool classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Minimum heuristic confidence before a verdict is trusted
    pub confidence_threshold: f32,
    /// Verdict when neither declarations nor heuristics decide
    pub default_snapshot: bool,
    /// Explicit per-tool declarations (tool name -> modifies files)
    pub declared: HashMap<String, bool>,
    /// Extra regexes counted as file-modifying signals
    pub modifying_patterns: Vec<String>,
    /// Extra regexes counted as read-only signals
    pub readonly_patterns: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            default_snapshot: true,
            declared: HashMap::new(),
            modifying_patterns: Vec::new(),
            readonly_patterns: Vec::new(),
        }
    }
}

/// On-disk mirror configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Write snapshots to disk as well as memory
    pub enabled: bool,
    /// Data directory; relative paths resolve against the project root
    pub data_dir: String,
    /// Temp files older than this are swept on startup
    #[serde(with = "humantime_serde")]
    pub temp_max_age: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            data_dir: ".rewind".to_string(),
            temp_max_age: Duration::from_secs(60 * 60),
        }
    }
}

impl MirrorConfig {
    /// Resolve the data directory, expanding `~` and env vars
    pub fn resolve_dir(&self, project_root: &std::path::Path) -> PathBuf {
        let expanded = shellexpand::full(&self.data_dir)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| self.data_dir.clone());
        let path = PathBuf::from(expanded);
        if path.is_absolute() {
            path
        } else {
            project_root.join(path)
        }
    }
}
