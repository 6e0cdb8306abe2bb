//! Table store: create, append, overwrite and read typed records.
//!
//! Every operation takes the container and the caller's [`Schema`] and keeps
//! no state between calls. The compound type persisted with a table is the
//! source of truth: each operation checks the caller's schema against it
//! before any record bytes move.

use tracing::{debug, info};

use crate::container::{Container, TableDescription};
use crate::error::{Error, Result};
use puretable_format::{chunk_bytes_for, MAX_NAME_LEN};

use crate::layout::{check_layout, pack_records, unpack_records};
use crate::record::Record;
use crate::schema::{FieldType, Schema};

/// Records per chunk when none is given.
pub const DEFAULT_CHUNK_RECORDS: u64 = 10;

/// Deflate level used when compression is requested without a level.
pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;

/// Creation options of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    /// Free-form title stored with the table.
    pub title: String,
    /// Records per chunk; the granularity of storage growth. Must be at least 1.
    pub chunk_records: u64,
    /// Deflate-compress chunks.
    pub compress: bool,
    /// Deflate level (0-9) used when `compress` is set.
    pub deflate_level: u32,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            chunk_records: DEFAULT_CHUNK_RECORDS,
            compress: false,
            deflate_level: DEFAULT_DEFLATE_LEVEL,
        }
    }
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_chunk_records(mut self, chunk_records: u64) -> Self {
        self.chunk_records = chunk_records;
        self
    }

    /// Enable deflate compression at `level` (clamped to 9).
    pub fn with_deflate(mut self, level: u32) -> Self {
        self.compress = true;
        self.deflate_level = level.min(9);
        self
    }

    fn deflate(&self) -> Option<u32> {
        self.compress.then_some(self.deflate_level.min(9))
    }
}

/// Summary of a stored table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub nfields: usize,
    pub nrecords: u64,
    /// Size of one packed record.
    pub record_size: usize,
    pub chunk_records: u64,
    pub compressed: bool,
    pub title: String,
}

/// One field as persisted with a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    /// `None` when the stored type has no [`FieldType`] equivalent.
    pub field_type: Option<FieldType>,
    pub disk_offset: usize,
    pub disk_size: usize,
}

/// Look up `name` and check `schema` against its persisted type.
fn compatible_table<C: Container + ?Sized>(
    container: &C,
    name: &str,
    schema: &Schema,
) -> Result<TableDescription> {
    let description = container
        .describe_table(name)?
        .ok_or_else(|| Error::UnknownTable(name.to_string()))?;
    schema.check_compatible(name, &description.datatype)?;
    Ok(description)
}

fn check_index(name: &str, start: u64, count: u64, nrecords: u64) -> Result<()> {
    match start.checked_add(count) {
        Some(end) if end <= nrecords => Ok(()),
        _ => Err(Error::IndexOutOfRange {
            table: name.to_string(),
            start,
            count,
            nrecords,
        }),
    }
}

/// Create table `name` holding `records`.
///
/// Fails with [`Error::NameCollision`] when the name is taken and with
/// [`Error::EmptyBatch`] when `records` is empty. Nothing is left behind
/// when creation fails.
pub fn create_table<C, T>(
    container: &mut C,
    name: &str,
    schema: &Schema,
    records: &[T],
    options: &TableOptions,
) -> Result<()>
where
    C: Container + ?Sized,
    T: Record,
{
    if container.describe_table(name)?.is_some() {
        return Err(Error::NameCollision(name.to_string()));
    }
    if options.chunk_records == 0
        || chunk_bytes_for(options.chunk_records, schema.disk_record_size()).is_err()
    {
        return Err(Error::InvalidChunkSize(options.chunk_records));
    }
    for text in [name, options.title.as_str()] {
        if text.len() > MAX_NAME_LEN {
            return Err(Error::NameTooLong(text.len()));
        }
    }
    if records.is_empty() {
        return Err(Error::EmptyBatch(name.to_string()));
    }
    let packed = pack_records(schema, records)?;
    let description = TableDescription {
        title: options.title.clone(),
        datatype: schema.to_datatype(),
        nrecords: records.len() as u64,
        chunk_records: options.chunk_records,
        deflate_level: options.deflate(),
    };
    container.create_table(name, &description, &packed)?;
    info!(
        table = name,
        nrecords = records.len(),
        record_size = schema.disk_record_size(),
        chunk_records = options.chunk_records,
        compressed = options.compress,
        "created table"
    );
    Ok(())
}

/// Append `records` after the last stored record.
pub fn append_records<C, T>(container: &mut C, name: &str, schema: &Schema, records: &[T]) -> Result<()>
where
    C: Container + ?Sized,
    T: Record,
{
    let description = compatible_table(container, name, schema)?;
    check_layout::<T>(schema)?;
    if records.is_empty() {
        return Ok(());
    }
    let packed = pack_records(schema, records)?;
    container.append_records(name, &packed)?;
    debug!(
        table = name,
        appended = records.len(),
        nrecords = description.nrecords + records.len() as u64,
        "appended records"
    );
    Ok(())
}

/// Overwrite `records.len()` records starting at `start`.
///
/// Never grows the table: the range must lie inside the stored records.
pub fn write_records<C, T>(
    container: &mut C,
    name: &str,
    schema: &Schema,
    start: u64,
    records: &[T],
) -> Result<()>
where
    C: Container + ?Sized,
    T: Record,
{
    let description = compatible_table(container, name, schema)?;
    check_layout::<T>(schema)?;
    let count = records.len() as u64;
    check_index(name, start, count, description.nrecords)?;
    if records.is_empty() {
        return Ok(());
    }
    let packed = pack_records(schema, records)?;
    container.write_records(name, start, &packed)?;
    debug!(table = name, start, count, "wrote records");
    Ok(())
}

/// Read `count` records starting at `start`.
pub fn read_records<C, T>(container: &C, name: &str, schema: &Schema, start: u64, count: u64) -> Result<Vec<T>>
where
    C: Container + ?Sized,
    T: Record,
{
    let description = compatible_table(container, name, schema)?;
    check_layout::<T>(schema)?;
    check_index(name, start, count, description.nrecords)?;
    let packed = container.read_records(name, start, count)?;
    let records = unpack_records(schema, &packed, count as usize)?;
    debug!(table = name, start, count, "read records");
    Ok(records)
}

/// Read every record currently stored.
pub fn read_table<C, T>(container: &C, name: &str, schema: &Schema) -> Result<Vec<T>>
where
    C: Container + ?Sized,
    T: Record,
{
    let nrecords = compatible_table(container, name, schema)?.nrecords;
    read_records(container, name, schema, 0, nrecords)
}

/// Whether `container` holds a table named `name`.
pub fn table_exists<C: Container + ?Sized>(container: &C, name: &str) -> Result<bool> {
    Ok(container.describe_table(name)?.is_some())
}

/// Summary of table `name`.
pub fn table_info<C: Container + ?Sized>(container: &C, name: &str) -> Result<TableInfo> {
    let d = container
        .describe_table(name)?
        .ok_or_else(|| Error::UnknownTable(name.to_string()))?;
    Ok(TableInfo {
        nfields: d.datatype.members().map_or(0, |m| m.len()),
        nrecords: d.nrecords,
        record_size: d.record_size(),
        chunk_records: d.chunk_records,
        compressed: d.deflate_level.is_some(),
        title: d.title,
    })
}

/// Persisted fields of table `name`, in record order.
pub fn field_info<C: Container + ?Sized>(container: &C, name: &str) -> Result<Vec<FieldInfo>> {
    let d = container
        .describe_table(name)?
        .ok_or_else(|| Error::UnknownTable(name.to_string()))?;
    Ok(d.datatype
        .members()
        .unwrap_or(&[])
        .iter()
        .map(|m| FieldInfo {
            name: m.name.clone(),
            field_type: FieldType::from_datatype(&m.datatype),
            disk_offset: m.byte_offset as usize,
            disk_size: m.datatype.type_size() as usize,
        })
        .collect())
}
