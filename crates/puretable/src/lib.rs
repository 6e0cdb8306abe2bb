//! Fixed-schema record tables in a seekable container file.
//!
//! A table is a named, growable sequence of records sharing one compound
//! layout. Native records keep whatever padding the compiler gives them;
//! on disk every record is the tight concatenation of its fields in schema
//! order, and the layout is stored with the table as a compound datatype.
//!
//! # Example
//!
//! ```no_run
//! use puretable::{create_table, read_records, FileContainer, Record, TableOptions};
//!
//! #[derive(Record, Clone, Copy)]
//! #[repr(C)]
//! struct Reading {
//!     sensor: [u8; 8],
//!     celsius: f32,
//! }
//!
//! # fn main() -> puretable::Result<()> {
//! let schema = Reading::schema()?;
//! let mut file = FileContainer::create("readings.ptb")?;
//! let batch = [Reading { sensor: puretable::fixed_str("north"), celsius: 21.5 }];
//! create_table(&mut file, "readings", &schema, &batch, &TableOptions::default())?;
//! let first: Vec<Reading> = read_records(&file, "readings", &schema, 0, 1)?;
//! assert_eq!(first[0].celsius, 21.5);
//! file.close()?;
//! # Ok(())
//! # }
//! ```

extern crate self as puretable;

pub mod container;
pub mod error;
pub mod file_container;
pub mod layout;
pub mod library;
pub mod record;
pub mod schema;
pub mod table;

pub use container::{Container, MemoryContainer, TableDescription};
pub use error::{Error, Result, StorageError};
pub use file_container::{FileContainer, OpenMode};
pub use layout::{pack_bytes, pack_records, unpack_bytes, unpack_records};
pub use record::{fixed_str, str_from_fixed, NativeField, Record};
pub use schema::{FieldDescriptor, FieldType, Schema, SchemaBuilder, MAX_DISK_RECORD_SIZE};
pub use table::{
    append_records, create_table, field_info, read_records, read_table, table_exists, table_info,
    write_records, FieldInfo, TableInfo, TableOptions,
};

#[cfg(feature = "derive")]
pub use puretable_derive::Record;

pub use puretable_format as format;
