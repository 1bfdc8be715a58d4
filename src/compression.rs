//! Compression collaborators used by [crate::resource::package::Package] for resource payloads.
//!
//! The package treats a codec as a black box: bytes go in, bytes come out. The only contract the
//! package relies on is that `decompress` yields exactly the memory size recorded in the index.

use std::fmt::Debug;
use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lzzzz::lz4;
use thiserror::Error;

/// Preallocation cap for streaming decompression, growth past it happens on demand.
const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

/// First output buffer for LZ4 blocks, before growing towards the expected size.
const MIN_LZ4_CHUNK: usize = 64 * 1024;

static ZLIB: ZlibCompression = ZlibCompression { level: 6 };
static LZ4: Lz4Compression = Lz4Compression {
    acceleration: lz4::ACC_LEVEL_DEFAULT,
};

/// The built-in codec that writes `tag` into index records, if any.
pub fn codec_for_tag(tag: u16) -> Option<&'static dyn CompressionCodec> {
    match tag {
        ZlibCompression::TAG => Some(&ZLIB),
        Lz4Compression::TAG => Some(&LZ4),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Compression failed: {0}")]
    CompressFailed(String),

    #[error("Decompression failed: {0}")]
    DecompressFailed(String),

    #[error("Decompressed to {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u32, actual: usize },

    #[error("{compressed} compressed bytes cannot expand to {expected} bytes")]
    ImplausibleSize { compressed: usize, expected: u32 },
}

/// A stateless compressor shared by every resource of a package.
pub trait CompressionCodec: Debug + Send + Sync {
    /// The tag written into index records of resources compressed with this codec.
    fn compression_tag(&self) -> u16;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;

    /// Decompresses `data`, which must expand to exactly `expected_size` bytes.
    fn decompress(&self, data: &[u8], expected_size: u32) -> Result<Vec<u8>, CompressionError>;
}

/// zlib-wrapped DEFLATE, the compression the package format ships with.
#[derive(Copy, Clone, Debug)]
pub struct ZlibCompression {
    level: u32,
}

impl ZlibCompression {
    pub const TAG: u16 = 0x5A42;
    const MAX_RATIO: u64 = 1032;

    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for ZlibCompression {
    fn default() -> Self {
        Self::new(Compression::default().level())
    }
}

impl CompressionCodec for ZlibCompression {
    fn compression_tag(&self) -> u16 {
        Self::TAG
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut encoder = ZlibEncoder::new(
            Vec::with_capacity(data.len() / 2 + 16),
            Compression::new(self.level),
        );
        encoder
            .write_all(data)
            .map_err(|e| CompressionError::CompressFailed(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CompressionError::CompressFailed(e.to_string()))
    }

    fn decompress(&self, data: &[u8], expected_size: u32) -> Result<Vec<u8>, CompressionError> {
        check_plausible(data, expected_size, Self::MAX_RATIO)?;

        let mut output = Vec::with_capacity((expected_size as usize).min(MAX_PREALLOCATION));
        // One byte of slack lets an overlong stream be detected without reading all of it.
        ZlibDecoder::new(data)
            .take(u64::from(expected_size) + 1)
            .read_to_end(&mut output)
            .map_err(|e: io::Error| CompressionError::DecompressFailed(e.to_string()))?;

        if output.len() != expected_size as usize {
            return Err(CompressionError::SizeMismatch {
                expected: expected_size,
                actual: output.len(),
            });
        }
        Ok(output)
    }
}

/// LZ4 block compression.
#[derive(Copy, Clone, Debug)]
pub struct Lz4Compression {
    acceleration: i32,
}

impl Lz4Compression {
    pub const TAG: u16 = 0x4C5A;
    const MAX_RATIO: u64 = 255;

    pub fn new(acceleration: i32) -> Self {
        Self { acceleration }
    }
}

impl Default for Lz4Compression {
    fn default() -> Self {
        Self::new(lz4::ACC_LEVEL_DEFAULT)
    }
}

impl CompressionCodec for Lz4Compression {
    fn compression_tag(&self) -> u16 {
        Self::TAG
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut compressed_buffer = vec![0; lz4::max_compressed_size(data.len())];
        let compressed_size = lz4::compress(data, &mut compressed_buffer, self.acceleration)
            .map_err(|e| CompressionError::CompressFailed(e.to_string()))?;
        compressed_buffer.truncate(compressed_size);
        Ok(compressed_buffer)
    }

    fn decompress(&self, data: &[u8], expected_size: u32) -> Result<Vec<u8>, CompressionError> {
        check_plausible(data, expected_size, Self::MAX_RATIO)?;
        let expected = expected_size as usize;

        // The output only grows as far as the block actually decodes.
        let mut capacity = data
            .len()
            .saturating_mul(4)
            .clamp(MIN_LZ4_CHUNK, MAX_PREALLOCATION)
            .min(expected);
        while capacity < expected {
            let mut output = vec![0; capacity];
            let size = lz4::decompress_partial(data, &mut output, capacity)
                .map_err(|e| CompressionError::DecompressFailed(e.to_string()))?;
            if size < capacity {
                return Err(CompressionError::SizeMismatch {
                    expected: expected_size,
                    actual: size,
                });
            }
            capacity = capacity.saturating_mul(2).min(expected);
        }

        let mut output = vec![0; expected];
        let size = lz4::decompress(data, &mut output)
            .map_err(|e| CompressionError::DecompressFailed(e.to_string()))?;

        if size != expected {
            return Err(CompressionError::SizeMismatch {
                expected: expected_size,
                actual: size,
            });
        }
        Ok(output)
    }
}

fn check_plausible(data: &[u8], expected_size: u32, max_ratio: u64) -> Result<(), CompressionError> {
    // Small payloads carry fixed framing overhead, so only the ratio of large ones is meaningful.
    let ceiling = (data.len() as u64).saturating_mul(max_ratio).max(4096);
    if u64::from(expected_size) > ceiling {
        return Err(CompressionError::ImplausibleSize {
            compressed: data.len(),
            expected: expected_size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0..4096u32).map(|i| (i % 17) as u8).collect()
    }

    #[test]
    fn test_zlib_restores_original() -> Result<(), CompressionError> {
        let codec = ZlibCompression::default();
        let data = sample();
        let compressed = codec.compress(&data)?;
        assert!(compressed.len() < data.len());
        assert_eq!(codec.decompress(&compressed, data.len() as u32)?, data);
        Ok(())
    }

    #[test]
    fn test_lz4_restores_original() -> Result<(), CompressionError> {
        let codec = Lz4Compression::default();
        let data = sample();
        let compressed = codec.compress(&data)?;
        assert_eq!(codec.decompress(&compressed, data.len() as u32)?, data);
        Ok(())
    }

    #[test]
    fn test_zlib_rejects_wrong_expected_size() -> Result<(), CompressionError> {
        let codec = ZlibCompression::default();
        let compressed = codec.compress(&sample())?;

        assert!(matches!(
            codec.decompress(&compressed, 100),
            Err(CompressionError::SizeMismatch { expected: 100, .. })
        ));
        assert!(matches!(
            codec.decompress(&compressed, 5000),
            Err(CompressionError::SizeMismatch { expected: 5000, actual: 4096 })
        ));
        Ok(())
    }

    #[test]
    fn test_implausible_sizes_are_rejected_before_allocating() {
        let codec = ZlibCompression::default();
        assert!(matches!(
            codec.decompress(&[0x78, 0x9C, 0x03, 0x00], 0x7FFF_FFFF),
            Err(CompressionError::ImplausibleSize { .. })
        ));
    }

    #[test]
    fn test_lz4_grows_output_for_highly_compressible_data() -> Result<(), CompressionError> {
        let codec = Lz4Compression::default();
        let data = vec![0u8; 1024 * 1024];
        let compressed = codec.compress(&data)?;
        assert!(compressed.len() * 4 < MIN_LZ4_CHUNK);
        assert_eq!(codec.decompress(&compressed, data.len() as u32)?, data);
        Ok(())
    }

    #[test]
    fn test_lz4_short_block_with_inflated_size_fails() -> Result<(), CompressionError> {
        let codec = Lz4Compression::default();
        // An xorshift sequence barely compresses, so the claimed size stays plausible.
        let mut state = 0x2545_F491u32;
        let data = (0..100_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect::<Vec<_>>();
        let compressed = codec.compress(&data)?;

        assert!(matches!(
            codec.decompress(&compressed, 5_000_000),
            Err(CompressionError::SizeMismatch { expected: 5_000_000, actual: 100_000 })
        ));
        Ok(())
    }

    #[test]
    fn test_codec_for_tag() {
        for tag in [ZlibCompression::TAG, Lz4Compression::TAG] {
            assert_eq!(codec_for_tag(tag).map(|codec| codec.compression_tag()), Some(tag));
        }
        assert!(codec_for_tag(0).is_none());
    }

    #[test]
    fn test_incompressible_input_may_grow() -> Result<(), CompressionError> {
        let codec = ZlibCompression::new(9);
        let data = vec![0xA5];
        let compressed = codec.compress(&data)?;
        assert!(compressed.len() > data.len());
        assert_eq!(codec.decompress(&compressed, 1)?, data);
        Ok(())
    }
}
