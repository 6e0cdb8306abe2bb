//! Binary format of puretable containers.
//!
//! This crate encodes and decodes the metadata structures of a record
//! table container: the superblock, the table directory, table headers
//! (whose record layout is an HDF5-style compound datatype message) and
//! the deflate filter applied to chunks. It performs no I/O.

pub mod checksum;
pub mod datatype;
pub mod directory;
pub mod error;
pub mod filters;
pub mod signature;
pub mod superblock;
pub mod table_header;

pub use datatype::{CompoundMember, Datatype};
pub use directory::Directory;
pub use error::FormatError;
pub use superblock::{Superblock, SUPERBLOCK_SIZE};
pub use table_header::{chunk_bytes_for, ChunkEntry, TableHeader, MAX_CHUNK_BYTES, MAX_NAME_LEN};
