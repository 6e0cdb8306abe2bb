//! Error types for container format encoding and decoding.

/// Errors that can occur when decoding puretable binary structures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The container magic signature was not found at offset 0.
    #[error("container signature not found")]
    SignatureNotFound,

    /// The superblock or directory version is not supported.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    /// Unexpected end of data.
    #[error("unexpected EOF: need {expected} bytes, have {available}")]
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },

    /// A block signature (table header, directory) did not match.
    #[error("invalid {0} signature")]
    InvalidBlockSignature(&'static str),

    /// Checksum mismatch over a metadata block.
    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },

    /// Datatype class not understood by this crate.
    #[error("unsupported datatype class: {0}")]
    InvalidDatatypeClass(u8),

    /// Datatype version not understood for the given class.
    #[error("unsupported datatype version {version} for class {class}")]
    InvalidDatatypeVersion {
        /// Datatype class.
        class: u8,
        /// Version found in the message.
        version: u8,
    },

    /// Invalid string padding value in a string datatype.
    #[error("invalid string padding: {0}")]
    InvalidStringPadding(u8),

    /// Invalid character set value in a string datatype.
    #[error("invalid character set: {0}")]
    InvalidCharacterSet(u8),

    /// A name stored in the file is not valid UTF-8.
    #[error("invalid UTF-8 in stored name")]
    InvalidName,

    /// The deflate filter failed.
    #[error("deflate filter failed: {0}")]
    Deflate(String),

    /// A decompressed chunk did not have the expected size.
    #[error("chunk size mismatch: expected {expected} bytes, got {actual}")]
    ChunkSizeMismatch {
        /// Expected uncompressed size.
        expected: usize,
        /// Actual uncompressed size.
        actual: usize,
    },

    /// One chunk of the table would exceed the largest chunk a container holds.
    #[error("a chunk of {chunk_records} records of {record_size} bytes exceeds the chunk size limit")]
    ChunkTooLarge {
        chunk_records: u64,
        record_size: usize,
    },

    /// A table name or title does not fit its length prefix.
    #[error("name of {0} bytes is longer than the 65535-byte limit")]
    NameTooLong(usize),
}
