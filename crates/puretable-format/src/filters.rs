//! Deflate filter for compressed chunks.

use std::io::{Read, Write};

use crate::error::FormatError;

/// Compress a chunk with zlib.
pub fn deflate_compress(data: &[u8], level: u32) -> Result<Vec<u8>, FormatError> {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| FormatError::Deflate(e.to_string()))?;
    encoder.finish().map_err(|e| FormatError::Deflate(e.to_string()))
}

/// Decompress a zlib chunk whose uncompressed size must be `expected_size`.
pub fn deflate_decompress(data: &[u8], expected_size: usize) -> Result<Vec<u8>, FormatError> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut result = Vec::with_capacity(expected_size);
    decoder
        .read_to_end(&mut result)
        .map_err(|e| FormatError::Deflate(e.to_string()))?;
    if result.len() != expected_size {
        return Err(FormatError::ChunkSizeMismatch {
            expected: expected_size,
            actual: result.len(),
        });
    }
    Ok(result)
}
