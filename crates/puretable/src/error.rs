//! Error types for schema construction, table operations and storage.

use std::path::PathBuf;

use puretable_format::FormatError;

/// Failure reported by the storage container.
///
/// These are passed through verbatim; the table layer never retries them.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container's metadata could not be decoded.
    #[error("container format error: {0}")]
    Format(#[from] FormatError),

    /// A mutation was attempted through a read-only handle.
    #[error("container {} is open read-only", .0.display())]
    ReadOnly(PathBuf),

    /// The file is already open in this process in a conflicting mode.
    #[error("container {} is already open in a conflicting mode", .0.display())]
    Locked(PathBuf),

    /// The container refers to data that is not where its metadata says.
    #[error("container is corrupt: {0}")]
    Corrupt(String),

    /// The container has no table under this name.
    #[error("no table named `{0}` in container")]
    Missing(String),

    /// The container already holds a table under this name.
    #[error("a table named `{0}` already exists in container")]
    AlreadyExists(String),

    /// A record range outside the stored records was requested.
    #[error("records {start}..{end} are outside the {nrecords} stored records")]
    OutOfRange {
        start: u64,
        end: u64,
        nrecords: u64,
    },
}

/// Errors returned by schema construction and table operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A field with this name is already part of the schema.
    #[error("duplicate field `{0}` in schema")]
    DuplicateField(String),

    /// `finalize` was called without any field.
    #[error("schema has no fields")]
    EmptySchema,

    /// The record stride does not cover every field.
    #[error("record stride {stride} is smaller than the field extent {extent}")]
    InvalidStride {
        stride: usize,
        extent: usize,
    },

    /// A field description cannot be represented.
    #[error("invalid field `{name}`: {reason}")]
    InvalidField {
        name: String,
        reason: String,
    },

    /// A table with this name already exists.
    #[error("table `{0}` already exists")]
    NameCollision(String),

    /// No table with this name exists.
    #[error("table `{0}` does not exist")]
    UnknownTable(String),

    /// The persisted record size differs from the schema's disk record size.
    #[error("schema mismatch for table `{table}`: schema packs {expected}-byte records, table stores {actual}-byte records")]
    SchemaMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// A field's name or type differs from the persisted compound type.
    #[error("field {index} of table `{table}` does not match the persisted field `{persisted}`")]
    IncompatibleField {
        table: String,
        index: usize,
        persisted: String,
    },

    /// The requested record range exceeds the table.
    #[error("records {start}..{start}+{count} are out of range for table `{table}` holding {nrecords} records")]
    IndexOutOfRange {
        table: String,
        start: u64,
        count: u64,
        nrecords: u64,
    },

    /// Chunking granularity must be at least one record, and one chunk must
    /// fit the container's chunk size limit.
    #[error("invalid chunk size of {0} records")]
    InvalidChunkSize(u64),

    /// A table name or title longer than a container can store.
    #[error("table name or title of {0} bytes exceeds 65535 bytes")]
    NameTooLong(usize),

    /// A table cannot be created from an empty batch.
    #[error("cannot create table `{0}` from an empty record batch")]
    EmptyBatch(String),

    /// A typed batch's element size differs from the schema stride.
    #[error("record type is {actual} bytes but the schema stride is {expected} bytes")]
    StrideMismatch {
        expected: usize,
        actual: usize,
    },

    /// A schema field covers bytes outside every field of the record type,
    /// such as padding.
    #[error("field `{name}` at offset {offset} ({size} bytes) is not inside a field of the record type")]
    FieldOutsideRecord {
        name: String,
        offset: usize,
        size: usize,
    },

    /// A raw buffer does not hold the number of records it should.
    #[error("buffer of {actual} bytes cannot hold {count} records of {record_size} bytes")]
    BufferLength {
        actual: usize,
        count: usize,
        record_size: usize,
    },

    /// Failure from the underlying container.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(StorageError::Io(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
