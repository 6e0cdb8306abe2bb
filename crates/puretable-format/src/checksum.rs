//! Metadata checksums.
//!
//! Every metadata block (superblock, directory, table header) ends with a
//! CRC-32 of the bytes that precede it.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// CRC-32 of a byte slice.
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Append the checksum of `buf` to `buf`.
pub fn seal(buf: &mut Vec<u8>) {
    let sum = checksum(buf);
    buf.extend_from_slice(&sum.to_le_bytes());
}

/// Verify a block whose last four bytes are the checksum of the rest.
///
/// Returns the block body without the checksum.
pub fn verify(block: &[u8]) -> Result<&[u8], FormatError> {
    if block.len() < 4 {
        return Err(FormatError::UnexpectedEof {
            expected: 4,
            available: block.len(),
        });
    }
    let (body, tail) = block.split_at(block.len() - 4);
    let expected = LittleEndian::read_u32(tail);
    let computed = checksum(body);
    if expected != computed {
        return Err(FormatError::ChecksumMismatch { expected, computed });
    }
    Ok(body)
}
