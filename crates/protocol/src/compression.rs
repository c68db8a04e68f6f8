//! Compression layer for packet batches

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tideway_core::{ProxyError, Result};

/// Upper bound for a single inflated batch
pub const MAX_DECOMPRESSED_SIZE: u64 = 12 * 1024 * 1024;

/// Compression method applied to whole batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    None = 0,
    #[default]
    Zlib = 1,
}

impl CompressionType {
    /// Parse the value of the `compression` config key
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "zlib" | "on" => Some(Self::Zlib),
            _ => None,
        }
    }
}

/// Compress data using the specified method
pub fn compress(data: &[u8], method: CompressionType) -> Result<Vec<u8>> {
    match method {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Decompress data using the specified method
pub fn decompress(data: &[u8], method: CompressionType) -> Result<Vec<u8>> {
    match method {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Zlib => {
            let mut decoder = ZlibDecoder::new(data).take(MAX_DECOMPRESSED_SIZE + 1);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            if decompressed.len() as u64 > MAX_DECOMPRESSED_SIZE {
                return Err(ProxyError::InvalidData("Batch exceeds decompression limit".into()));
            }
            Ok(decompressed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_shrinks_repetitive_data() {
        let original = vec![0u8; 4096];

        let compressed = compress(&original, CompressionType::Zlib).unwrap();
        assert!(compressed.len() < original.len());

        let decompressed = decompress(&compressed, CompressionType::Zlib).unwrap();
        assert_eq!(original, decompressed);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decompress(b"definitely not zlib", CompressionType::Zlib).is_err());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(CompressionType::from_name("ZLIB"), Some(CompressionType::Zlib));
        assert_eq!(CompressionType::from_name("none"), Some(CompressionType::None));
        assert_eq!(CompressionType::from_name("bzip2"), None);
    }
}
