//! Container superblock: the fixed 40-byte block at offset 0.
//!
//! Layout (all little-endian):
//!
//! | bytes | field |
//! |-------|-------|
//! | 0..8   | signature |
//! | 8      | version |
//! | 9..12  | reserved |
//! | 12..20 | directory address |
//! | 20..28 | directory length |
//! | 28..36 | end-of-file address |
//! | 36..40 | checksum |
//!
//! Rewriting the superblock is the commit point of every mutation: a new
//! directory is only visible once the superblock points at it.

use byteorder::{ByteOrder, LittleEndian};

use crate::checksum;
use crate::error::FormatError;
use crate::signature::{check_signature, CONTAINER_SIGNATURE};

/// Size of the encoded superblock.
pub const SUPERBLOCK_SIZE: usize = 40;

/// Current superblock version.
pub const SUPERBLOCK_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub version: u8,
    /// Address of the current table directory.
    pub directory_address: u64,
    /// Encoded length of the current table directory.
    pub directory_length: u64,
    /// First unallocated byte in the file.
    pub eof_address: u64,
}

impl Superblock {
    /// Superblock of a freshly created container with an empty directory
    /// placed right after it.
    pub fn empty(directory_length: u64) -> Self {
        Self {
            version: SUPERBLOCK_VERSION,
            directory_address: SUPERBLOCK_SIZE as u64,
            directory_length,
            eof_address: SUPERBLOCK_SIZE as u64 + directory_length,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Superblock, FormatError> {
        check_signature(data)?;
        if data.len() < SUPERBLOCK_SIZE {
            return Err(FormatError::UnexpectedEof {
                expected: SUPERBLOCK_SIZE,
                available: data.len(),
            });
        }
        let d = checksum::verify(&data[..SUPERBLOCK_SIZE])?;
        let version = d[8];
        if version != SUPERBLOCK_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        Ok(Superblock {
            version,
            directory_address: LittleEndian::read_u64(&d[12..20]),
            directory_length: LittleEndian::read_u64(&d[20..28]),
            eof_address: LittleEndian::read_u64(&d[28..36]),
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SUPERBLOCK_SIZE);
        buf.extend_from_slice(&CONTAINER_SIGNATURE);
        buf.push(self.version);
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&self.directory_address.to_le_bytes());
        buf.extend_from_slice(&self.directory_length.to_le_bytes());
        buf.extend_from_slice(&self.eof_address.to_le_bytes());
        checksum::seal(&mut buf);
        buf
    }
}
