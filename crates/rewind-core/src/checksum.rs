//! Content digests used for identity and deduplication

use crate::error::{RewindError, RewindResult};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Digest algorithm for content checksums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Md5,
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Length of the lowercase hex digest
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
        }
    }

    /// Start an incremental digest
    pub fn hasher(&self) -> ContentHasher {
        match self {
            Self::Md5 => ContentHasher::Md5(md5::Md5::new()),
            Self::Sha1 => ContentHasher::Sha1(sha1::Sha1::new()),
            Self::Sha256 => ContentHasher::Sha256(sha2::Sha256::new()),
        }
    }

    /// Digest an in-memory buffer
    pub fn digest_bytes(&self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha1 => write!(f, "sha1"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = RewindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => Err(RewindError::config(format!(
                "Unknown checksum algorithm: {}",
                other
            ))),
        }
    }
}

/// Incremental hasher over one of the supported algorithms
pub enum ContentHasher {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

impl ContentHasher {
    /// Feed more bytes
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    /// Finish and return the lowercase hex digest
    pub fn finalize(self) -> String {
        match self {
            Self::Md5(h) => format!("{:x}", h.finalize()),
            Self::Sha1(h) => format!("{:x}", h.finalize()),
            Self::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Digest a file by streaming it in `chunk_size` pieces
///
/// Peak memory is bounded by the chunk size regardless of file size.
/// Returns the digest and the number of bytes read.
pub async fn digest_file(
    path: &Path,
    algorithm: ChecksumAlgorithm,
    chunk_size: usize,
) -> RewindResult<(String, u64)> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        RewindError::io_with_path(format!("Failed to open file: {}", e), path.display().to_string())
    })?;

    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let read = file.read(&mut buffer).await.map_err(|e| {
            RewindError::io_with_path(
                format!("Failed to read file: {}", e),
                path.display().to_string(),
            )
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        total += read as u64;
    }

    Ok((hasher.finalize(), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            ChecksumAlgorithm::Md5.digest_bytes(b"hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            ChecksumAlgorithm::Sha1.digest_bytes(b"hello"),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert_eq!(
            ChecksumAlgorithm::Sha256.digest_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_hex_len_matches_digest() {
        for algo in [
            ChecksumAlgorithm::Md5,
            ChecksumAlgorithm::Sha1,
            ChecksumAlgorithm::Sha256,
        ] {
            assert_eq!(algo.digest_bytes(b"x").len(), algo.hex_len());
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("SHA256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
        assert!("crc32".parse::<ChecksumAlgorithm>().is_err());
    }

    #[tokio::test]
    async fn test_streamed_digest_matches_buffer() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        let (digest, size) = digest_file(&path, ChecksumAlgorithm::Md5, 1024)
            .await
            .unwrap();
        assert_eq!(size, data.len() as u64);
        assert_eq!(digest, ChecksumAlgorithm::Md5.digest_bytes(&data));
    }
}
