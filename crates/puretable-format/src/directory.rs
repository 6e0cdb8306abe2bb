//! Table directory: the list of table headers a superblock points at.

use byteorder::{ByteOrder, LittleEndian};

use crate::checksum;
use crate::error::FormatError;
use crate::signature::DIRECTORY_SIGNATURE;
use crate::table_header::TableHeader;

const DIRECTORY_VERSION: u8 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directory {
    pub tables: Vec<TableHeader>,
}

impl Directory {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&DIRECTORY_SIGNATURE);
        buf.push(DIRECTORY_VERSION);
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&(self.tables.len() as u32).to_le_bytes());
        for table in &self.tables {
            buf.extend_from_slice(&table.serialize());
        }
        checksum::seal(&mut buf);
        buf
    }

    /// Parse a directory block of exactly `data.len()` bytes.
    pub fn parse(data: &[u8]) -> Result<Directory, FormatError> {
        let body = checksum::verify(data)?;
        if body.len() < 12 {
            return Err(FormatError::UnexpectedEof {
                expected: 12,
                available: body.len(),
            });
        }
        if body[..4] != DIRECTORY_SIGNATURE {
            return Err(FormatError::InvalidBlockSignature("directory"));
        }
        if body[4] != DIRECTORY_VERSION {
            return Err(FormatError::UnsupportedVersion(body[4]));
        }
        let count = LittleEndian::read_u32(&body[8..12]) as usize;
        let mut pos = 12;
        let mut tables = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let (header, consumed) = TableHeader::parse(&body[pos..])?;
            pos += consumed;
            tables.push(header);
        }
        Ok(Directory { tables })
    }

    pub fn get(&self, name: &str) -> Option<&TableHeader> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TableHeader> {
        self.tables.iter_mut().find(|t| t.name == name)
    }
}
