//! Blob compression for the on-disk mirror

use crate::error::{RewindError, RewindResult};

/// Compress bytes using gzip
pub(super) fn compress_bytes(content: &[u8]) -> RewindResult<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(content)
        .map_err(|e| RewindError::storage(format!("Failed to compress blob: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| RewindError::storage(format!("Failed to finish compression: {}", e)))
}

/// Decompress gzip bytes
pub(super) fn decompress_bytes(compressed: &[u8]) -> RewindResult<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoder = GzDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| RewindError::storage(format!("Failed to decompress blob: {}", e)))?;
    Ok(decompressed)
}
