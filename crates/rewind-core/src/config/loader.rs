//! Configuration loading from TOML files and environment variables

use super::types::RewindConfig;
use crate::checksum::ChecksumAlgorithm;
use crate::error::{RewindError, RewindResult};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Load configuration from a TOML file
///
/// A missing file yields the default configuration rooted at the file's
/// parent directory.
pub async fn load_config_from_file(path: impl AsRef<Path>) -> RewindResult<RewindConfig> {
    let path = path.as_ref();

    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        return Ok(RewindConfig::new(root));
    }

    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        RewindError::io_with_path(format!("Failed to read config: {}", e), path.display().to_string())
    })?;

    RewindConfig::from_toml_str(&content)
}

/// Load a file and then apply `REWIND_*` environment overrides
pub async fn load_config_with_env(path: impl AsRef<Path>) -> RewindResult<RewindConfig> {
    let mut config = load_config_from_file(path).await?;
    apply_env_overrides(&mut config, |key| env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Apply overrides from a variable lookup
///
/// Takes a lookup function instead of reading the process environment
/// directly so overrides can be exercised without mutating global state.
pub(super) fn apply_env_overrides(
    config: &mut RewindConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> RewindResult<()> {
    if let Some(value) = lookup("REWIND_PROJECT_ROOT") {
        config.project_root = value.into();
    }

    if let Some(value) = lookup("REWIND_MAX_SNAPSHOTS") {
        config.storage.max_snapshots = value
            .parse()
            .map_err(|_| RewindError::config("Invalid REWIND_MAX_SNAPSHOTS value"))?;
    }

    if let Some(value) = lookup("REWIND_MEMORY_LIMIT") {
        config.storage.memory_limit_bytes = value
            .parse()
            .map_err(|_| RewindError::config("Invalid REWIND_MEMORY_LIMIT value"))?;
    }

    if let Some(value) = lookup("REWIND_CHECKSUM") {
        config.storage.checksum = value.parse::<ChecksumAlgorithm>()?;
    }

    if let Some(value) = lookup("REWIND_GIT_ENABLED") {
        config.git.enabled = parse_bool(&value)
            .ok_or_else(|| RewindError::config("Invalid REWIND_GIT_ENABLED value"))?;
    }

    if let Some(value) = lookup("REWIND_GIT_TIMEOUT_SECS") {
        let secs: u64 = value
            .parse()
            .map_err(|_| RewindError::config("Invalid REWIND_GIT_TIMEOUT_SECS value"))?;
        config.git.command_timeout = Duration::from_secs(secs);
    }

    if let Some(value) = lookup("REWIND_MIRROR_ENABLED") {
        config.mirror.enabled = parse_bool(&value)
            .ok_or_else(|| RewindError::config("Invalid REWIND_MIRROR_ENABLED value"))?;
    }

    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
