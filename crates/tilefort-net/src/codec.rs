//! Byte-buffer compression for chunk payloads.

/// Errors produced by a [`ChunkCodec`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The compressed stream was malformed.
    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    /// The decompressed size differs from what the caller expected.
    #[error("decompressed {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Size the caller expected.
        expected: usize,
        /// Size actually produced.
        actual: usize,
    },
}

/// A general-purpose byte compressor with a known output size on decompress.
pub trait ChunkCodec: Send + Sync {
    fn compress(&self, data: &[u8]) -> Vec<u8>;

    /// Decompresses `data`, failing unless exactly `known_size` bytes result.
    fn decompress(&self, data: &[u8], known_size: usize) -> Result<Vec<u8>, CodecError>;
}

/// LZ4 block compression without a size header.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl ChunkCodec for Lz4Codec {
    fn compress(&self, data: &[u8]) -> Vec<u8> {
        lz4_flex::block::compress(data)
    }

    fn decompress(&self, data: &[u8], known_size: usize) -> Result<Vec<u8>, CodecError> {
        let out = lz4_flex::block::decompress(data, known_size)
            .map_err(|e| CodecError::DecompressFailed(e.to_string()))?;
        if out.len() != known_size {
            return Err(CodecError::SizeMismatch {
                expected: known_size,
                actual: out.len(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_data_compresses_well() {
        let data = vec![7u8; 512];
        let packed = Lz4Codec.compress(&data);
        assert!(packed.len() < 64);
        assert_eq!(Lz4Codec.decompress(&packed, 512).unwrap(), data);
    }

    #[test]
    fn test_varied_data_roundtrips() {
        let data: Vec<u8> = (0..512u32).map(|i| (i * 31 % 251) as u8).collect();
        let packed = Lz4Codec.compress(&data);
        assert_eq!(Lz4Codec.decompress(&packed, 512).unwrap(), data);
    }

    #[test]
    fn test_short_output_is_a_size_mismatch() {
        let packed = Lz4Codec.compress(&[1u8; 100]);
        assert!(Lz4Codec.decompress(&packed, 512).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Lz4Codec.decompress(&[0xFF, 0xFF, 0xFF], 512).is_err());
    }
}
