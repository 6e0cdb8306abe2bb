//! Schema descriptors: how one native record maps onto one packed disk record.
//!
//! Memory offsets and sizes describe the record as the host lays it out,
//! padding included. Disk offsets never look at them: field `i` lands at the
//! sum of the disk sizes of fields `0..i`.

use puretable_format::datatype::{
    make_f32_type, make_f64_type, make_fixed_string_type, make_int_type, DatatypeByteOrder,
};
use puretable_format::{CompoundMember, Datatype};

use crate::error::{Error, Result};

/// Largest packed record, and so largest field, a compound datatype can describe.
pub const MAX_DISK_RECORD_SIZE: usize = u32::MAX as usize;

/// On-disk type tag of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Null-padded byte string of the given length.
    FixedString(usize),
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

/// Value class of a field, shared by its memory and disk representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldClass {
    Bytes,
    Unsigned,
    Signed,
    Float,
}

impl FieldType {
    /// Bytes this field occupies in a packed disk record.
    pub fn disk_size(&self) -> usize {
        match self {
            FieldType::FixedString(n) => *n,
            FieldType::U8 | FieldType::I8 => 1,
            FieldType::U16 | FieldType::I16 => 2,
            FieldType::U32 | FieldType::I32 | FieldType::F32 => 4,
            FieldType::U64 | FieldType::I64 | FieldType::F64 => 8,
        }
    }

    pub(crate) fn class(&self) -> FieldClass {
        match self {
            FieldType::FixedString(_) => FieldClass::Bytes,
            FieldType::U8 | FieldType::U16 | FieldType::U32 | FieldType::U64 => FieldClass::Unsigned,
            FieldType::I8 | FieldType::I16 | FieldType::I32 | FieldType::I64 => FieldClass::Signed,
            FieldType::F32 | FieldType::F64 => FieldClass::Float,
        }
    }

    /// Whether a native value of `memory_size` bytes can be converted to this type.
    fn accepts_memory_size(&self, memory_size: usize) -> bool {
        match self.class() {
            FieldClass::Bytes => memory_size >= 1,
            FieldClass::Unsigned | FieldClass::Signed => matches!(memory_size, 1 | 2 | 4 | 8),
            FieldClass::Float => matches!(memory_size, 4 | 8),
        }
    }

    /// Datatype message persisted for this field.
    pub fn to_datatype(&self) -> Datatype {
        match self {
            FieldType::FixedString(n) => make_fixed_string_type(*n as u32),
            FieldType::F32 => make_f32_type(),
            FieldType::F64 => make_f64_type(),
            other => make_int_type(
                other.disk_size() as u32,
                other.class() == FieldClass::Signed,
            ),
        }
    }

    /// Recover the field type from a persisted datatype.
    ///
    /// Only little-endian, full-precision scalars and fixed strings map back.
    pub fn from_datatype(datatype: &Datatype) -> Option<FieldType> {
        match datatype {
            Datatype::String { size, .. } => Some(FieldType::FixedString(*size as usize)),
            Datatype::FixedPoint { size, byte_order: DatatypeByteOrder::LittleEndian, signed, bit_offset: 0, bit_precision }
                if *bit_precision as u32 == size * 8 =>
            {
                match (*size, *signed) {
                    (1, false) => Some(FieldType::U8),
                    (2, false) => Some(FieldType::U16),
                    (4, false) => Some(FieldType::U32),
                    (8, false) => Some(FieldType::U64),
                    (1, true) => Some(FieldType::I8),
                    (2, true) => Some(FieldType::I16),
                    (4, true) => Some(FieldType::I32),
                    (8, true) => Some(FieldType::I64),
                    _ => None,
                }
            }
            Datatype::FloatingPoint { size: 4, byte_order: DatatypeByteOrder::LittleEndian, .. } => {
                Some(FieldType::F32)
            }
            Datatype::FloatingPoint { size: 8, byte_order: DatatypeByteOrder::LittleEndian, .. } => {
                Some(FieldType::F64)
            }
            _ => None,
        }
    }
}

/// One field of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
    memory_offset: usize,
    memory_size: usize,
    disk_offset: usize,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Offset of the field inside one native record.
    pub fn memory_offset(&self) -> usize {
        self.memory_offset
    }

    /// Size of the field inside one native record.
    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    /// Offset of the field inside one packed disk record.
    pub fn disk_offset(&self) -> usize {
        self.disk_offset
    }

    pub fn disk_size(&self) -> usize {
        self.field_type.disk_size()
    }
}

/// Collects field descriptions until [`SchemaBuilder::finalize`] locks them.
///
/// ```
/// use puretable::{FieldType, SchemaBuilder};
///
/// let mut builder = SchemaBuilder::new();
/// builder
///     .describe_field("id", FieldType::U32, 0, 4)?
///     .describe_field("score", FieldType::F64, 8, 8)?;
/// let schema = builder.finalize(16)?;
/// assert_eq!(schema.disk_record_size(), 12);
/// # Ok::<(), puretable::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDescriptor>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Register one field.
    ///
    /// `memory_offset` and `memory_size` describe where the field lives in
    /// the native record. Numeric fields may use a memory width different
    /// from the disk width of `field_type`; values are converted on the way
    /// in and out.
    pub fn describe_field(
        &mut self,
        name: &str,
        field_type: FieldType,
        memory_offset: usize,
        memory_size: usize,
    ) -> Result<&mut Self> {
        if name.is_empty() {
            return Err(invalid(name, "field names must not be empty"));
        }
        if name.contains('\0') {
            return Err(invalid(name, "field names must not contain NUL"));
        }
        if self.fields.iter().any(|f| f.name == name) {
            return Err(Error::DuplicateField(name.to_string()));
        }
        if field_type.disk_size() == 0 {
            return Err(invalid(name, "fixed strings need at least one byte on disk"));
        }
        if field_type.disk_size() > MAX_DISK_RECORD_SIZE {
            return Err(invalid(name, "fixed string is longer than a record can be"));
        }
        if !field_type.accepts_memory_size(memory_size) {
            return Err(invalid(
                name,
                &format!("a {memory_size}-byte native value cannot hold {field_type:?}"),
            ));
        }
        if memory_offset.checked_add(memory_size).is_none() {
            return Err(invalid(name, "memory offset overflows"));
        }
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            field_type,
            memory_offset,
            memory_size,
            disk_offset: 0,
        });
        Ok(self)
    }

    /// Lock the field list for records that are `record_stride` bytes apart in memory.
    pub fn finalize(self, record_stride: usize) -> Result<Schema> {
        if self.fields.is_empty() {
            return Err(Error::EmptySchema);
        }
        let extent = self
            .fields
            .iter()
            .map(|f| f.memory_offset + f.memory_size)
            .max()
            .unwrap_or(0);
        if record_stride < extent {
            return Err(Error::InvalidStride {
                stride: record_stride,
                extent,
            });
        }

        let mut fields = self.fields;
        let mut disk_offset = 0usize;
        for field in &mut fields {
            field.disk_offset = disk_offset;
            disk_offset = disk_offset
                .checked_add(field.field_type.disk_size())
                .filter(|&end| end <= MAX_DISK_RECORD_SIZE)
                .ok_or_else(|| invalid(&field.name, "packed record grows past 4 GiB"))?;
        }

        Ok(Schema {
            fields,
            record_stride,
            disk_record_size: disk_offset,
        })
    }
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidField {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Finalized, immutable record schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
    record_stride: usize,
    disk_record_size: usize,
}

impl Schema {
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Distance in bytes between consecutive native records.
    pub fn record_stride(&self) -> usize {
        self.record_stride
    }

    /// Size of one packed disk record.
    pub fn disk_record_size(&self) -> usize {
        self.disk_record_size
    }

    /// The compound datatype persisted with a table of this schema.
    pub fn to_datatype(&self) -> Datatype {
        Datatype::Compound {
            size: self.disk_record_size as u32,
            members: self
                .fields
                .iter()
                .map(|f| CompoundMember {
                    name: f.name.clone(),
                    byte_offset: f.disk_offset as u64,
                    datatype: f.field_type.to_datatype(),
                })
                .collect(),
        }
    }

    /// Check this schema against the compound type persisted for `table`.
    ///
    /// The persisted type wins: a differing record size is a
    /// [`Error::SchemaMismatch`], a differing field an [`Error::IncompatibleField`].
    pub fn check_compatible(&self, table: &str, persisted: &Datatype) -> Result<()> {
        let actual = persisted.type_size() as usize;
        if actual != self.disk_record_size {
            return Err(Error::SchemaMismatch {
                table: table.to_string(),
                expected: self.disk_record_size,
                actual,
            });
        }
        let members = persisted.members().unwrap_or(&[]);
        for index in 0..self.fields.len().max(members.len()) {
            let matches = match (self.fields.get(index), members.get(index)) {
                (Some(field), Some(member)) => {
                    field.name == member.name
                        && field.disk_offset as u64 == member.byte_offset
                        && FieldType::from_datatype(&member.datatype) == Some(field.field_type)
                }
                _ => false,
            };
            if !matches {
                return Err(Error::IncompatibleField {
                    table: table.to_string(),
                    index,
                    persisted: members
                        .get(index)
                        .map(|m| m.name.clone())
                        .unwrap_or_default(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_builder() -> SchemaBuilder {
        let mut b = SchemaBuilder::new();
        b.describe_field("name", FieldType::FixedString(32), 0, 32)
            .unwrap()
            .describe_field("age", FieldType::U8, 32, 1)
            .unwrap()
            .describe_field("weight", FieldType::I32, 36, 4)
            .unwrap()
            .describe_field("IQ", FieldType::F32, 40, 4)
            .unwrap();
        b
    }

    #[test]
    fn disk_offsets_are_tightly_packed() {
        let schema = person_builder().finalize(44).unwrap();
        let offsets: Vec<usize> = schema.fields().iter().map(|f| f.disk_offset()).collect();
        assert_eq!(offsets, vec![0, 32, 33, 37]);
        assert_eq!(schema.disk_record_size(), 41);
        assert_eq!(schema.record_stride(), 44);
    }

    #[test]
    fn disk_offsets_ignore_memory_order() {
        // same fields, scrambled native placement
        let mut b = SchemaBuilder::new();
        b.describe_field("name", FieldType::FixedString(32), 12, 32)
            .unwrap()
            .describe_field("age", FieldType::U8, 8, 1)
            .unwrap()
            .describe_field("weight", FieldType::I32, 0, 4)
            .unwrap()
            .describe_field("IQ", FieldType::F32, 4, 4)
            .unwrap();
        let scrambled = b.finalize(48).unwrap();
        let packed = person_builder().finalize(44).unwrap();
        assert_eq!(scrambled.to_datatype(), packed.to_datatype());
    }

    #[test]
    fn duplicate_field() {
        let mut b = person_builder();
        let err = b.describe_field("age", FieldType::U16, 44, 2).unwrap_err();
        assert!(matches!(err, Error::DuplicateField(name) if name == "age"));
    }

    #[test]
    fn empty_schema() {
        assert!(matches!(SchemaBuilder::new().finalize(8), Err(Error::EmptySchema)));
    }

    #[test]
    fn stride_smaller_than_extent() {
        let err = person_builder().finalize(43).unwrap_err();
        assert!(matches!(err, Error::InvalidStride { stride: 43, extent: 44 }));
    }

    #[test]
    fn stride_equal_to_extent() {
        assert!(person_builder().finalize(44).is_ok());
    }

    #[test]
    fn rejects_impossible_widths() {
        let mut b = SchemaBuilder::new();
        assert!(matches!(
            b.describe_field("x", FieldType::I32, 0, 3),
            Err(Error::InvalidField { .. })
        ));
        assert!(matches!(
            b.describe_field("y", FieldType::F64, 0, 2),
            Err(Error::InvalidField { .. })
        ));
        assert!(matches!(
            b.describe_field("z", FieldType::FixedString(0), 0, 4),
            Err(Error::InvalidField { .. })
        ));
        assert!(matches!(
            b.describe_field("", FieldType::U8, 0, 1),
            Err(Error::InvalidField { .. })
        ));
    }

    #[test]
    fn rejects_nul_in_field_name() {
        let mut b = SchemaBuilder::new();
        assert!(matches!(
            b.describe_field("a\0b", FieldType::U8, 0, 1),
            Err(Error::InvalidField { ref name, .. }) if name == "a\0b"
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn record_size_fits_the_datatype() {
        let mut b = SchemaBuilder::new();
        assert!(matches!(
            b.describe_field("huge", FieldType::FixedString(MAX_DISK_RECORD_SIZE + 1), 0, 1),
            Err(Error::InvalidField { .. })
        ));

        let mut b = SchemaBuilder::new();
        b.describe_field("big", FieldType::FixedString(MAX_DISK_RECORD_SIZE), 0, 1)
            .unwrap()
            .describe_field("more", FieldType::U8, 1, 1)
            .unwrap();
        assert!(matches!(
            b.finalize(2),
            Err(Error::InvalidField { ref name, .. }) if name == "more"
        ));

        let mut b = SchemaBuilder::new();
        b.describe_field("big", FieldType::FixedString(MAX_DISK_RECORD_SIZE), 0, 1).unwrap();
        let schema = b.finalize(1).unwrap();
        assert_eq!(schema.to_datatype().type_size(), u32::MAX);
    }

    #[test]
    fn width_conversion_is_allowed() {
        let mut b = SchemaBuilder::new();
        b.describe_field("count", FieldType::I16, 0, 8).unwrap();
        b.describe_field("ratio", FieldType::F32, 8, 8).unwrap();
        let schema = b.finalize(16).unwrap();
        assert_eq!(schema.disk_record_size(), 6);
    }

    #[test]
    fn datatype_round_trips_field_types() {
        for ty in [
            FieldType::FixedString(7),
            FieldType::U8,
            FieldType::U16,
            FieldType::U32,
            FieldType::U64,
            FieldType::I8,
            FieldType::I16,
            FieldType::I32,
            FieldType::I64,
            FieldType::F32,
            FieldType::F64,
        ] {
            assert_eq!(FieldType::from_datatype(&ty.to_datatype()), Some(ty));
        }
    }

    #[test]
    fn compatible_with_own_datatype() {
        let schema = person_builder().finalize(44).unwrap();
        schema.check_compatible("dset", &schema.to_datatype()).unwrap();
    }

    #[test]
    fn record_size_mismatch() {
        let schema = person_builder().finalize(44).unwrap();
        let mut b = SchemaBuilder::new();
        b.describe_field("name", FieldType::FixedString(16), 0, 16).unwrap();
        let other = b.finalize(16).unwrap();
        let err = schema.check_compatible("dset", &other.to_datatype()).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { expected: 41, actual: 16, .. }));
    }

    #[test]
    fn renamed_field_is_incompatible() {
        let schema = person_builder().finalize(44).unwrap();
        let mut b = SchemaBuilder::new();
        b.describe_field("name", FieldType::FixedString(32), 0, 32)
            .unwrap()
            .describe_field("age", FieldType::U8, 32, 1)
            .unwrap()
            .describe_field("mass", FieldType::I32, 36, 4)
            .unwrap()
            .describe_field("IQ", FieldType::F32, 40, 4)
            .unwrap();
        let renamed = b.finalize(44).unwrap();
        let err = schema.check_compatible("dset", &renamed.to_datatype()).unwrap_err();
        assert!(matches!(err, Error::IncompatibleField { index: 2, ref persisted, .. } if persisted == "mass"));
    }
}
