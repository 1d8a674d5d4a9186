//! Frame Compression
//!
//! Best-effort gzip for outbound payloads and decompression for inbound
//! binary frames. Compression is a capability: when it is unavailable or
//! does not pay off, payloads go out uncompressed.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Default size at which outbound payloads are compressed.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

/// Compression errors.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// The payload is not a gzip stream.
    #[error("payload is not gzip")]
    NotGzip,

    /// Decompression failed.
    #[error("decompression failed: {0}")]
    Io(#[from] std::io::Error),

    /// Compression is not available.
    #[error("compression unavailable")]
    Unavailable,
}

/// Compression strategy.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Compress `data` if worthwhile. `None` means send it as is.
    fn compress(&self, data: &[u8]) -> Option<Vec<u8>>;

    /// Decompress a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be decompressed.
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;

    /// Whether this strategy can compress at all.
    fn is_available(&self) -> bool;
}

/// Check if data is gzip compressed (magic bytes check).
#[inline]
#[must_use]
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

// =============================================================================
// Gzip
// =============================================================================

/// Gzip via `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    threshold: usize,
}

impl GzipCompressor {
    /// Create a compressor that only compresses payloads of at least
    /// `threshold` bytes.
    #[must_use]
    pub const fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Minimum payload size that gets compressed.
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_THRESHOLD)
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Option<Vec<u8>> {
        if data.len() < self.threshold {
            return None;
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        if let Err(e) = encoder.write_all(data) {
            tracing::debug!(error = %e, "Gzip compression failed, sending uncompressed");
            return None;
        }

        match encoder.finish() {
            // Only use compressed if it's actually smaller
            Ok(compressed) if compressed.len() < data.len() => Some(compressed),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Gzip compression failed, sending uncompressed");
                None
            }
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        if !is_gzip(data) {
            return Err(CompressionError::NotGzip);
        }

        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 4);
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn is_available(&self) -> bool {
        true
    }
}

// =============================================================================
// No-op
// =============================================================================

/// Pass-through strategy for environments without compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn compress(&self, _data: &[u8]) -> Option<Vec<u8>> {
        None
    }

    fn decompress(&self, _data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Err(CompressionError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payload_is_not_compressed() {
        let gzip = GzipCompressor::default();

        assert!(gzip.compress(&[b'x'; 100]).is_none());
    }

    #[test]
    fn large_payload_round_trips() {
        let gzip = GzipCompressor::default();
        let data = "{\"type\":\"order\",\"qty\":1}".repeat(100);

        let compressed = gzip.compress(data.as_bytes()).unwrap();

        assert!(is_gzip(&compressed));
        assert!(compressed.len() < data.len());
        assert_eq!(gzip.decompress(&compressed).unwrap(), data.as_bytes());
    }

    #[test]
    fn incompressible_payload_is_left_alone() {
        let gzip = GzipCompressor::new(8);
        // Short, high-entropy input grows under gzip framing
        let data = [0x9a, 0x01, 0xf3, 0x77, 0x10, 0xc4, 0x5e, 0x2b];

        assert!(gzip.compress(&data).is_none());
    }

    #[test]
    fn decompress_rejects_non_gzip() {
        let gzip = GzipCompressor::default();

        assert!(matches!(
            gzip.decompress(b"{\"key\":\"AAPL\"}"),
            Err(CompressionError::NotGzip)
        ));
    }

    #[test]
    fn decompress_rejects_truncated_gzip() {
        let gzip = GzipCompressor::new(0);
        let compressed = gzip.compress(&[b'a'; 4096]).unwrap();

        let result = gzip.decompress(&compressed[..compressed.len() / 2]);

        assert!(matches!(result, Err(CompressionError::Io(_))));
    }

    #[test]
    fn noop_is_unavailable() {
        let noop = NoopCompressor;

        assert!(!noop.is_available());
        assert!(noop.compress(&[0; 4096]).is_none());
        assert!(matches!(
            noop.decompress(&[0x1f, 0x8b]),
            Err(CompressionError::Unavailable)
        ));
    }

    #[test]
    fn is_gzip_magic() {
        assert!(is_gzip(&[0x1f, 0x8b, 0x08]));
        assert!(!is_gzip(&[0x00, 0x00]));
        assert!(!is_gzip(&[0x1f]));
    }
}
