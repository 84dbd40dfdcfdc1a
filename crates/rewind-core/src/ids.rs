//! Identifier generation and validation
//!
//! Snapshot ids, feature branch names and content hashes are all minted
//! here so their formats stay consistent with the validators below.

use crate::checksum::ChecksumAlgorithm;
use crate::types::SnapshotId;
use chrono::{DateTime, Utc};

/// Length of generated snapshot ids
pub const SNAPSHOT_ID_LEN: usize = 32;

/// Maximum slug length inside branch names
const MAX_SLUG_LEN: usize = 40;

/// Random snapshot id (UUID v4, hex without dashes)
pub fn random_snapshot_id() -> SnapshotId {
    SnapshotId::from_string(uuid::Uuid::new_v4().simple().to_string())
}

/// Deterministic snapshot id derived from instruction, time and sequence
pub fn deterministic_snapshot_id(
    instruction: &str,
    timestamp: DateTime<Utc>,
    sequence: u64,
) -> SnapshotId {
    let material = format!("{}\0{}\0{}", instruction, timestamp.to_rfc3339(), sequence);
    let digest = ChecksumAlgorithm::Sha256.digest_bytes(material.as_bytes());
    SnapshotId::from_string(&digest[..SNAPSHOT_ID_LEN])
}

/// Content hash with the configured algorithm
pub fn content_hash(content: &[u8], algorithm: ChecksumAlgorithm) -> String {
    algorithm.digest_bytes(content)
}

/// Lowercase, dash-separated slug of at most `max_len` characters
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(text.len().min(max_len));
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= max_len {
            break;
        }
    }

    slug.truncate(max_len);
    slug.trim_end_matches('-').to_string()
}

/// Feature branch name: `<prefix>/<YYYYmmdd-HHMMSS>-<slug>`
pub fn branch_name(prefix: &str, timestamp: DateTime<Utc>, instruction: &str) -> String {
    let slug = slugify(instruction, MAX_SLUG_LEN);
    let slug = if slug.is_empty() { "snapshot".to_string() } else { slug };
    format!("{}/{}-{}", prefix, timestamp.format("%Y%m%d-%H%M%S"), slug)
}

/// Snapshot ids are 8-64 lowercase hex characters
pub fn is_valid_snapshot_id(id: &str) -> bool {
    (8..=64).contains(&id.len()) && id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

/// Subset of `git check-ref-format` rules for branch names
pub fn is_valid_branch_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('-') || name.starts_with('/') || name.ends_with('/') {
        return false;
    }
    if name.ends_with('.') || name.ends_with(".lock") || name == "@" {
        return false;
    }
    if name.contains("..") || name.contains("//") || name.contains("@{") {
        return false;
    }
    if name
        .split('/')
        .any(|component| component.starts_with('.'))
    {
        return false;
    }
    !name
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
}

/// Checksum has the right length and alphabet for the algorithm
pub fn is_valid_checksum(algorithm: ChecksumAlgorithm, checksum: &str) -> bool {
    checksum.len() == algorithm.hex_len()
        && checksum.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}
