//! Tests for configuration loading

use super::loader::apply_env_overrides;
use super::*;
use crate::checksum::ChecksumAlgorithm;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let config = RewindConfig::default();
    assert_eq!(config.storage.max_snapshots, 50);
    assert_eq!(config.storage.memory_limit_bytes, 100 * 1024 * 1024);
    assert_eq!(config.storage.checksum, ChecksumAlgorithm::Md5);
    assert_eq!(config.git.branch_prefix, "rewind");
    assert_eq!(config.git.command_timeout, Duration::from_secs(30));
    assert!(!config.mirror.enabled);
    assert!((config.monitor.confidence_threshold - 0.5).abs() < f32::EPSILON);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_toml() {
    let config = RewindConfig::from_toml_str(
        r#"
        [storage]
        max_snapshots = 5
        checksum = "sha256"

        [git]
        command_timeout = "10s"

        [mirror]
        temp_max_age = "2h"
        "#,
    )
    .unwrap();

    assert_eq!(config.storage.max_snapshots, 5);
    assert_eq!(config.storage.checksum, ChecksumAlgorithm::Sha256);
    assert_eq!(config.git.command_timeout, Duration::from_secs(10));
    assert_eq!(config.mirror.temp_max_age, Duration::from_secs(7200));
    // untouched sections keep their defaults
    assert_eq!(config.tracking.max_concurrent_io, 8);
}

#[test]
fn test_invalid_values_rejected() {
    assert!(RewindConfig::from_toml_str("[storage]\nmax_snapshots = 0").is_err());
    assert!(RewindConfig::from_toml_str("[monitor]\nconfidence_threshold = 1.5").is_err());
    assert!(RewindConfig::from_toml_str("[git]\nbranch_prefix = \"bad prefix\"").is_err());
    assert!(RewindConfig::from_toml_str("[storage\n").is_err());
}

#[test]
fn test_env_overrides() {
    let vars: HashMap<&str, &str> = [
        ("REWIND_MAX_SNAPSHOTS", "7"),
        ("REWIND_CHECKSUM", "sha1"),
        ("REWIND_GIT_ENABLED", "off"),
        ("REWIND_GIT_TIMEOUT_SECS", "3"),
    ]
    .into_iter()
    .collect();

    let mut config = RewindConfig::default();
    apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string())).unwrap();

    assert_eq!(config.storage.max_snapshots, 7);
    assert_eq!(config.storage.checksum, ChecksumAlgorithm::Sha1);
    assert!(!config.git.enabled);
    assert_eq!(config.git.command_timeout, Duration::from_secs(3));
}

#[test]
fn test_env_override_bad_number() {
    let mut config = RewindConfig::default();
    let result = apply_env_overrides(&mut config, |k| {
        (k == "REWIND_MEMORY_LIMIT").then(|| "lots".to_string())
    });
    assert!(result.is_err());
}

#[test]
fn test_mirror_dir_resolution() {
    let mirror = MirrorConfig::default();
    let root = std::path::Path::new("/tmp/project");
    assert_eq!(mirror.resolve_dir(root), root.join(".rewind"));
}

#[tokio::test]
async fn test_load_missing_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let config = load_config_from_file(temp.path().join("rewind.toml"))
        .await
        .unwrap();
    assert_eq!(config.project_root, temp.path());
    assert_eq!(config.storage.max_snapshots, 50);
}

#[tokio::test]
async fn test_load_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("rewind.toml");
    tokio::fs::write(&path, "[storage]\nmax_snapshots = 3\n")
        .await
        .unwrap();
    let config = load_config_from_file(&path).await.unwrap();
    assert_eq!(config.storage.max_snapshots, 3);
}
