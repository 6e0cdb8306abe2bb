//! Table headers: the persisted metadata of one record table.
//!
//! A header carries everything needed to interpret the table's chunks
//! without the writer's in-memory schema: the compound datatype (field
//! names, disk offsets, disk types), the record count, the chunking
//! granularity, the filter and the chunk index.

use byteorder::{ByteOrder, LittleEndian};

use crate::checksum;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::signature::TABLE_HEADER_SIGNATURE;

const TABLE_HEADER_VERSION: u8 = 1;

/// Largest uncompressed chunk, in bytes (4 GiB - 1, as for HDF5 chunks).
pub const MAX_CHUNK_BYTES: u64 = u32::MAX as u64;

/// Longest table name or title, in bytes.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;
const FLAG_DEFLATE: u8 = 0x01;

/// Location of one stored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntry {
    /// Absolute file address of the chunk.
    pub address: u64,
    /// Bytes occupied on disk (compressed size when deflated, allocated
    /// capacity otherwise).
    pub stored_size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableHeader {
    pub name: String,
    pub title: String,
    /// Compound datatype of one record.
    pub datatype: Datatype,
    pub nrecords: u64,
    /// Records per chunk, fixed at creation.
    pub chunk_records: u64,
    /// Deflate level when the table is compressed.
    pub deflate_level: Option<u32>,
    pub chunks: Vec<ChunkEntry>,
}

fn ensure_len(data: &[u8], offset: usize, needed: usize) -> Result<(), FormatError> {
    if offset + needed > data.len() {
        Err(FormatError::UnexpectedEof {
            expected: offset + needed,
            available: data.len(),
        })
    } else {
        Ok(())
    }
}

fn read_name(data: &[u8], pos: usize) -> Result<(String, usize), FormatError> {
    ensure_len(data, pos, 2)?;
    let len = LittleEndian::read_u16(&data[pos..pos + 2]) as usize;
    ensure_len(data, pos + 2, len)?;
    let name = std::str::from_utf8(&data[pos + 2..pos + 2 + len])
        .map_err(|_| FormatError::InvalidName)?
        .to_string();
    Ok((name, 2 + len))
}

/// Containers check names with [`check_name_len`] before they reach a header.
fn write_name(buf: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    let len = bytes.len().min(MAX_NAME_LEN);
    buf.extend_from_slice(&(len as u16).to_le_bytes());
    buf.extend_from_slice(&bytes[..len]);
}

/// Size in bytes of a full chunk of `chunk_records` records.
///
/// Fails when the chunk would be larger than [`MAX_CHUNK_BYTES`].
pub fn chunk_bytes_for(chunk_records: u64, record_size: usize) -> Result<usize, FormatError> {
    chunk_records
        .checked_mul(record_size as u64)
        .filter(|&bytes| bytes <= MAX_CHUNK_BYTES)
        .map(|bytes| bytes as usize)
        .ok_or(FormatError::ChunkTooLarge {
            chunk_records,
            record_size,
        })
}

/// Check that `name` fits its on-disk length prefix.
pub fn check_name_len(name: &str) -> Result<(), FormatError> {
    if name.len() > MAX_NAME_LEN {
        return Err(FormatError::NameTooLong(name.len()));
    }
    Ok(())
}

impl TableHeader {
    /// Size in bytes of one packed record.
    pub fn record_size(&self) -> usize {
        self.datatype.type_size() as usize
    }

    /// Uncompressed size in bytes of one full chunk.
    pub fn chunk_bytes(&self) -> Result<usize, FormatError> {
        chunk_bytes_for(self.chunk_records, self.record_size())
    }

    /// Number of chunks needed to hold `nrecords` records.
    pub fn chunks_for(&self, nrecords: u64) -> usize {
        nrecords.div_ceil(self.chunk_records) as usize
    }

    pub fn serialize(&self) -> Vec<u8> {
        let dt = self.datatype.serialize();
        let mut buf = Vec::with_capacity(64 + dt.len() + self.chunks.len() * 16);
        buf.extend_from_slice(&TABLE_HEADER_SIGNATURE);
        buf.push(TABLE_HEADER_VERSION);
        let (flags, level) = match self.deflate_level {
            Some(level) => (FLAG_DEFLATE, level.min(9) as u8),
            None => (0, 0),
        };
        buf.push(flags);
        buf.push(level);
        buf.push(0);
        write_name(&mut buf, &self.name);
        write_name(&mut buf, &self.title);
        buf.extend_from_slice(&(dt.len() as u32).to_le_bytes());
        buf.extend_from_slice(&dt);
        buf.extend_from_slice(&self.nrecords.to_le_bytes());
        buf.extend_from_slice(&self.chunk_records.to_le_bytes());
        buf.extend_from_slice(&(self.chunks.len() as u64).to_le_bytes());
        for chunk in &self.chunks {
            buf.extend_from_slice(&chunk.address.to_le_bytes());
            buf.extend_from_slice(&chunk.stored_size.to_le_bytes());
        }
        checksum::seal(&mut buf);
        buf
    }

    /// Parse a header. Returns `(TableHeader, bytes_consumed)`.
    pub fn parse(data: &[u8]) -> Result<(TableHeader, usize), FormatError> {
        ensure_len(data, 0, 8)?;
        if data[..4] != TABLE_HEADER_SIGNATURE {
            return Err(FormatError::InvalidBlockSignature("table header"));
        }
        if data[4] != TABLE_HEADER_VERSION {
            return Err(FormatError::UnsupportedVersion(data[4]));
        }
        let deflate_level = (data[5] & FLAG_DEFLATE != 0).then_some(data[6] as u32);
        let mut pos = 8;

        let (name, used) = read_name(data, pos)?;
        pos += used;
        let (title, used) = read_name(data, pos)?;
        pos += used;

        ensure_len(data, pos, 4)?;
        let dt_len = LittleEndian::read_u32(&data[pos..pos + 4]) as usize;
        pos += 4;
        ensure_len(data, pos, dt_len)?;
        let (datatype, _) = Datatype::parse(&data[pos..pos + dt_len])?;
        pos += dt_len;

        ensure_len(data, pos, 24)?;
        let nrecords = LittleEndian::read_u64(&data[pos..pos + 8]);
        let chunk_records = LittleEndian::read_u64(&data[pos + 8..pos + 16]);
        let nchunks = LittleEndian::read_u64(&data[pos + 16..pos + 24]) as usize;
        pos += 24;

        let index_len = nchunks.checked_mul(16).ok_or(FormatError::UnexpectedEof {
            expected: usize::MAX,
            available: data.len(),
        })?;
        ensure_len(data, pos, index_len + 4)?;
        let mut chunks = Vec::with_capacity(nchunks);
        for i in 0..nchunks {
            let at = pos + i * 16;
            chunks.push(ChunkEntry {
                address: LittleEndian::read_u64(&data[at..at + 8]),
                stored_size: LittleEndian::read_u64(&data[at + 8..at + 16]),
            });
        }
        pos += index_len;
        checksum::verify(&data[..pos + 4])?;

        Ok((
            TableHeader {
                name,
                title,
                datatype,
                nrecords,
                chunk_records,
                deflate_level,
                chunks,
            },
            pos + 4,
        ))
    }
}
