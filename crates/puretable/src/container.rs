//! The storage container a table lives in.
//!
//! The table layer only needs a handful of primitives from its container:
//! look up a table's persisted description, create a table with its initial
//! payload, append, overwrite a record range and read a record range. All
//! record bytes crossing this boundary are packed disk records.

use std::collections::BTreeMap;

use puretable_format::table_header::check_name_len;
use puretable_format::{chunk_bytes_for, Datatype};

use crate::error::StorageError;

/// Persisted description of a table, as stored by its container.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    pub title: String,
    /// Compound datatype of one record: the source of truth for the layout.
    pub datatype: Datatype,
    pub nrecords: u64,
    /// Records per chunk, fixed at creation.
    pub chunk_records: u64,
    /// Deflate level when chunks are compressed.
    pub deflate_level: Option<u32>,
}

impl TableDescription {
    /// Size of one packed record.
    pub fn record_size(&self) -> usize {
        self.datatype.type_size() as usize
    }
}

/// Storage primitives a table is built on.
///
/// Implementations validate their own invariants (a create never replaces
/// an existing table, ranges stay inside the stored records) and report
/// violations as [`StorageError`]s; the table layer checks the same
/// conditions first so callers see the precise table-level error.
pub trait Container {
    /// Names of all tables, in ascending order.
    fn table_names(&self) -> Vec<String>;

    /// Description of the table named `name`, if there is one.
    fn describe_table(&self, name: &str) -> Result<Option<TableDescription>, StorageError>;

    /// Create `name` holding `records`. Either the whole table becomes
    /// visible or nothing does.
    fn create_table(
        &mut self,
        name: &str,
        description: &TableDescription,
        records: &[u8],
    ) -> Result<(), StorageError>;

    /// Append packed records after the last stored record.
    fn append_records(&mut self, name: &str, records: &[u8]) -> Result<(), StorageError>;

    /// Overwrite stored records starting at `start`.
    fn write_records(&mut self, name: &str, start: u64, records: &[u8]) -> Result<(), StorageError>;

    /// Read `count` packed records starting at `start`.
    fn read_records(&self, name: &str, start: u64, count: u64) -> Result<Vec<u8>, StorageError>;
}

pub(crate) fn check_range(start: u64, count: u64, nrecords: u64) -> Result<(), StorageError> {
    match start.checked_add(count) {
        Some(end) if end <= nrecords => Ok(()),
        end => Err(StorageError::OutOfRange {
            start,
            end: end.unwrap_or(u64::MAX),
            nrecords,
        }),
    }
}

pub(crate) fn check_whole_records(records: &[u8], record_size: usize) -> Result<u64, StorageError> {
    if record_size == 0 || records.len() % record_size != 0 {
        return Err(StorageError::Corrupt(format!(
            "{} bytes is not a whole number of {record_size}-byte records",
            records.len()
        )));
    }
    Ok((records.len() / record_size) as u64)
}

#[derive(Debug, Clone)]
struct MemoryTable {
    description: TableDescription,
    data: Vec<u8>,
}

/// Container holding its tables in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    tables: BTreeMap<String, MemoryTable>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, name: &str) -> Result<&MemoryTable, StorageError> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::Missing(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, StorageError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::Missing(name.to_string()))
    }
}

impl Container for MemoryContainer {
    fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn describe_table(&self, name: &str) -> Result<Option<TableDescription>, StorageError> {
        Ok(self.tables.get(name).map(|t| t.description.clone()))
    }

    fn create_table(
        &mut self,
        name: &str,
        description: &TableDescription,
        records: &[u8],
    ) -> Result<(), StorageError> {
        if self.tables.contains_key(name) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        // the limits FileContainer enforces
        chunk_bytes_for(description.chunk_records, description.record_size())?;
        check_name_len(name)?;
        check_name_len(&description.title)?;
        let nrecords = check_whole_records(records, description.record_size())?;
        let mut description = description.clone();
        description.nrecords = nrecords;
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                description,
                data: records.to_vec(),
            },
        );
        Ok(())
    }

    fn append_records(&mut self, name: &str, records: &[u8]) -> Result<(), StorageError> {
        let table = self.table_mut(name)?;
        let added = check_whole_records(records, table.description.record_size())?;
        table.data.extend_from_slice(records);
        table.description.nrecords += added;
        Ok(())
    }

    fn write_records(&mut self, name: &str, start: u64, records: &[u8]) -> Result<(), StorageError> {
        let table = self.table_mut(name)?;
        let record_size = table.description.record_size();
        let count = check_whole_records(records, record_size)?;
        check_range(start, count, table.description.nrecords)?;
        let at = start as usize * record_size;
        table.data[at..at + records.len()].copy_from_slice(records);
        Ok(())
    }

    fn read_records(&self, name: &str, start: u64, count: u64) -> Result<Vec<u8>, StorageError> {
        let table = self.table(name)?;
        check_range(start, count, table.description.nrecords)?;
        let record_size = table.description.record_size();
        let at = start as usize * record_size;
        Ok(table.data[at..at + count as usize * record_size].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use puretable_format::datatype::make_int_type;
    use puretable_format::CompoundMember;

    fn description() -> TableDescription {
        TableDescription {
            title: "ids".into(),
            datatype: Datatype::Compound {
                size: 2,
                members: vec![CompoundMember {
                    name: "id".into(),
                    byte_offset: 0,
                    datatype: make_int_type(2, false),
                }],
            },
            nrecords: 0,
            chunk_records: 4,
            deflate_level: None,
        }
    }

    #[test]
    fn create_counts_records() {
        let mut c = MemoryContainer::new();
        c.create_table("ids", &description(), &[1, 0, 2, 0, 3, 0]).unwrap();
        assert_eq!(c.describe_table("ids").unwrap().unwrap().nrecords, 3);
        assert_eq!(c.table_names(), vec!["ids"]);
    }

    #[test]
    fn create_twice_fails() {
        let mut c = MemoryContainer::new();
        c.create_table("ids", &description(), &[1, 0]).unwrap();
        assert!(matches!(
            c.create_table("ids", &description(), &[1, 0]),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn partial_record_rejected() {
        let mut c = MemoryContainer::new();
        assert!(matches!(
            c.create_table("ids", &description(), &[1, 0, 2]),
            Err(StorageError::Corrupt(_))
        ));
        assert!(c.describe_table("ids").unwrap().is_none());
    }

    #[test]
    fn append_write_read() {
        let mut c = MemoryContainer::new();
        c.create_table("ids", &description(), &[1, 0, 2, 0]).unwrap();
        c.append_records("ids", &[3, 0]).unwrap();
        c.write_records("ids", 0, &[9, 0]).unwrap();
        assert_eq!(c.read_records("ids", 0, 3).unwrap(), vec![9, 0, 2, 0, 3, 0]);
        assert!(matches!(
            c.read_records("ids", 2, 2),
            Err(StorageError::OutOfRange { start: 2, end: 4, nrecords: 3 })
        ));
    }

    #[test]
    fn file_limits_apply_in_memory() {
        let mut c = MemoryContainer::new();
        let mut huge = description();
        huge.chunk_records = u64::MAX;
        assert!(matches!(
            c.create_table("t", &huge, &[0, 0]),
            Err(StorageError::Format(puretable_format::FormatError::ChunkTooLarge { .. }))
        ));
        let long = "x".repeat(puretable_format::MAX_NAME_LEN + 1);
        assert!(matches!(
            c.create_table(&long, &description(), &[0, 0]),
            Err(StorageError::Format(puretable_format::FormatError::NameTooLong(_)))
        ));
        assert!(c.table_names().is_empty());
    }

    #[test]
    fn range_overflow() {
        assert!(check_range(u64::MAX, 2, 10).is_err());
        assert!(check_range(10, 0, 10).is_ok());
    }
}
