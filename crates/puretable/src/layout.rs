//! Layout translation between native records and packed disk records.
//!
//! Packing walks the schema field by field: each field's native bytes are
//! converted to its disk type and written at its disk offset, so native
//! padding never reaches the disk and disk records never carry holes.
//!
//! Conversions:
//!
//! * fixed strings copy at most the disk size and zero-fill the rest. A
//!   longer native string is truncated silently; this is lossy by design of
//!   the fixed-width format and not an error.
//! * numbers are stored little-endian. When the native width differs from
//!   the disk width, integers saturate at the destination range and floats
//!   are rounded as by `as`.
//!
//! All functions here only touch caller-supplied buffers and may run
//! concurrently on independent batches.

use std::mem::{size_of, MaybeUninit};

use byteorder::{ByteOrder, LittleEndian, NativeEndian};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{FieldClass, FieldDescriptor, Schema};

/// Batches above this many records are split across threads when the
/// `parallel` feature is enabled.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 4096;

fn max_unsigned(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    }
}

fn clamp_signed(value: i64, width: usize) -> i64 {
    if width >= 8 {
        return value;
    }
    let bits = width * 8;
    value.clamp(-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
}

fn read_float<B: ByteOrder>(buf: &[u8]) -> f64 {
    if buf.len() == 4 {
        B::read_f32(buf) as f64
    } else {
        B::read_f64(buf)
    }
}

fn write_float<B: ByteOrder>(buf: &mut [u8], value: f64) {
    if buf.len() == 4 {
        B::write_f32(buf, value as f32);
    } else {
        B::write_f64(buf, value);
    }
}

/// Convert one field from native bytes (`src`, native order) to disk bytes
/// (`dst`, little-endian), or the other way round when `to_disk` is false.
fn convert_field(class: FieldClass, src: &[u8], dst: &mut [u8], to_disk: bool) {
    if class == FieldClass::Bytes {
        let n = src.len().min(dst.len());
        dst[..n].copy_from_slice(&src[..n]);
        dst[n..].fill(0);
        return;
    }
    if src.len() == dst.len() {
        dst.copy_from_slice(src);
        if cfg!(target_endian = "big") {
            dst.reverse();
        }
        return;
    }
    match (class, to_disk) {
        (FieldClass::Unsigned, true) => {
            let v = NativeEndian::read_uint(src, src.len());
            LittleEndian::write_uint(dst, v.min(max_unsigned(dst.len())), dst.len());
        }
        (FieldClass::Unsigned, false) => {
            let v = LittleEndian::read_uint(src, src.len());
            NativeEndian::write_uint(dst, v.min(max_unsigned(dst.len())), dst.len());
        }
        (FieldClass::Signed, true) => {
            let v = NativeEndian::read_int(src, src.len());
            LittleEndian::write_int(dst, clamp_signed(v, dst.len()), dst.len());
        }
        (FieldClass::Signed, false) => {
            let v = LittleEndian::read_int(src, src.len());
            NativeEndian::write_int(dst, clamp_signed(v, dst.len()), dst.len());
        }
        (FieldClass::Float, true) => write_float::<LittleEndian>(dst, read_float::<NativeEndian>(src)),
        (FieldClass::Float, false) => write_float::<NativeEndian>(dst, read_float::<LittleEndian>(src)),
        (FieldClass::Bytes, _) => unreachable!(),
    }
}

fn encode_field(field: &FieldDescriptor, native: &[u8], disk: &mut [u8]) {
    let at = field.disk_offset();
    convert_field(
        field.field_type().class(),
        native,
        &mut disk[at..at + field.disk_size()],
        true,
    );
}

fn decode_field(field: &FieldDescriptor, disk: &[u8], native: &mut [u8]) {
    let at = field.disk_offset();
    convert_field(
        field.field_type().class(),
        &disk[at..at + field.disk_size()],
        native,
        false,
    );
}

fn pack_one_bytes(schema: &Schema, native: &[u8], disk: &mut [u8]) {
    for field in schema.fields() {
        let at = field.memory_offset();
        encode_field(field, &native[at..at + field.memory_size()], disk);
    }
}

fn unpack_one_bytes(schema: &Schema, disk: &[u8], native: &mut [u8]) {
    for field in schema.fields() {
        let at = field.memory_offset();
        decode_field(field, disk, &mut native[at..at + field.memory_size()]);
    }
}

/// Pack a raw native buffer holding `native.len() / stride` records.
pub fn pack_bytes(schema: &Schema, native: &[u8]) -> Result<Vec<u8>> {
    let stride = schema.record_stride();
    if native.len() % stride != 0 {
        return Err(Error::BufferLength {
            actual: native.len(),
            count: native.len() / stride + 1,
            record_size: stride,
        });
    }
    let disk_size = schema.disk_record_size();
    let mut out = vec![0u8; native.len() / stride * disk_size];
    for (src, dst) in native.chunks_exact(stride).zip(out.chunks_exact_mut(disk_size)) {
        pack_one_bytes(schema, src, dst);
    }
    Ok(out)
}

/// Unpack `count` packed records into a raw native buffer.
///
/// Native padding bytes in the result are zero.
pub fn unpack_bytes(schema: &Schema, disk: &[u8], count: usize) -> Result<Vec<u8>> {
    let disk_size = schema.disk_record_size();
    check_disk_len(disk, count, disk_size)?;
    let stride = schema.record_stride();
    let mut out = vec![0u8; count * stride];
    for (src, dst) in disk.chunks_exact(disk_size).zip(out.chunks_exact_mut(stride)) {
        unpack_one_bytes(schema, src, dst);
    }
    Ok(out)
}

fn check_disk_len(disk: &[u8], count: usize, disk_size: usize) -> Result<()> {
    match count.checked_mul(disk_size) {
        Some(needed) if needed <= disk.len() => Ok(()),
        _ => Err(Error::BufferLength {
            actual: disk.len(),
            count,
            record_size: disk_size,
        }),
    }
}

/// Check that `schema` only touches field bytes of `T`.
///
/// Every field of `schema` must lie inside a single field of `T::schema()`,
/// so a caller-built schema can never read padding or straddle two fields.
pub(crate) fn check_layout<T: Record>(schema: &Schema) -> Result<()> {
    if schema.record_stride() != size_of::<T>() {
        return Err(Error::StrideMismatch {
            expected: schema.record_stride(),
            actual: size_of::<T>(),
        });
    }
    let native = T::schema()?;
    for field in schema.fields() {
        let (start, end) = (field.memory_offset(), field.memory_offset() + field.memory_size());
        let covered = native.fields().iter().any(|f| {
            f.memory_offset() <= start && end <= f.memory_offset() + f.memory_size()
        });
        if !covered {
            return Err(Error::FieldOutsideRecord {
                name: field.name().to_string(),
                offset: start,
                size: field.memory_size(),
            });
        }
    }
    Ok(())
}

fn pack_one<T: Record>(schema: &Schema, record: &T, disk: &mut [u8]) {
    let base = record as *const T as *const u8;
    for field in schema.fields() {
        // SAFETY: `check_layout` placed the range inside one field of
        // `T::schema()`, which `Record` guarantees is initialized field data.
        let native = unsafe {
            std::slice::from_raw_parts(base.add(field.memory_offset()), field.memory_size())
        };
        encode_field(field, native, disk);
    }
}

fn unpack_one<T: Record>(schema: &Schema, disk: &[u8]) -> T {
    let mut record = MaybeUninit::<T>::zeroed();
    let base = record.as_mut_ptr() as *mut u8;
    for field in schema.fields() {
        // SAFETY: in bounds as in `pack_one`; every byte of `record` is
        // initialized (zeroed), so handing out a byte slice is sound.
        let native = unsafe {
            std::slice::from_raw_parts_mut(base.add(field.memory_offset()), field.memory_size())
        };
        decode_field(field, disk, native);
    }
    // SAFETY: `Record` guarantees T is valid for zero bytes plus any field bytes.
    unsafe { record.assume_init() }
}

/// Pack a typed batch into consecutive disk records.
pub fn pack_records<T: Record>(schema: &Schema, records: &[T]) -> Result<Vec<u8>> {
    check_layout::<T>(schema)?;
    let disk_size = schema.disk_record_size();
    let mut out = vec![0u8; records.len() * disk_size];

    #[cfg(feature = "parallel")]
    if records.len() > PARALLEL_THRESHOLD {
        use rayon::prelude::*;
        out.par_chunks_exact_mut(disk_size)
            .zip(records.par_iter())
            .for_each(|(dst, record)| pack_one(schema, record, dst));
        return Ok(out);
    }

    for (dst, record) in out.chunks_exact_mut(disk_size).zip(records) {
        pack_one(schema, record, dst);
    }
    Ok(out)
}

/// Unpack `count` disk records into freshly allocated native records.
pub fn unpack_records<T: Record>(schema: &Schema, disk: &[u8], count: usize) -> Result<Vec<T>> {
    check_layout::<T>(schema)?;
    let disk_size = schema.disk_record_size();
    check_disk_len(disk, count, disk_size)?;
    let disk = &disk[..count * disk_size];

    #[cfg(feature = "parallel")]
    if count > PARALLEL_THRESHOLD {
        use rayon::prelude::*;
        return Ok(disk
            .par_chunks_exact(disk_size)
            .map(|src| unpack_one::<T>(schema, src))
            .collect());
    }

    Ok(disk
        .chunks_exact(disk_size)
        .map(|src| unpack_one::<T>(schema, src))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{fixed_str, str_from_fixed};
    use crate::schema::{FieldType, SchemaBuilder};
    use std::mem::offset_of;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Person {
        name: [u8; 32],
        age: u8,
        weight: i32,
        iq: f32,
    }

    unsafe impl Record for Person {
        fn schema() -> Result<Schema> {
            let mut b = SchemaBuilder::new();
            b.describe_field("name", FieldType::FixedString(32), offset_of!(Person, name), 32)?
                .describe_field("age", FieldType::U8, offset_of!(Person, age), 1)?
                .describe_field("weight", FieldType::I32, offset_of!(Person, weight), 4)?
                .describe_field("IQ", FieldType::F32, offset_of!(Person, iq), 4)?;
            b.finalize(size_of::<Person>())
        }
    }

    fn person(i: u32) -> Person {
        Person {
            name: fixed_str("Mitch Richling"),
            age: (23 + i) as u8,
            weight: 123 + i as i32,
            iq: 200.0 - (i as f32 * 2.5 + 2.0) / (i as f32 + 1.0),
        }
    }

    #[test]
    fn person_has_padding() {
        assert!(size_of::<Person>() > 41);
    }

    #[test]
    fn packed_layout_is_tight() {
        let schema = Person::schema().unwrap();
        let disk = pack_records(&schema, &[person(0)]).unwrap();
        assert_eq!(disk.len(), 41);
        assert_eq!(&disk[..14], b"Mitch Richling");
        assert!(disk[14..32].iter().all(|&b| b == 0));
        assert_eq!(disk[32], 23);
        assert_eq!(LittleEndian::read_i32(&disk[33..37]), 123);
        assert_eq!(LittleEndian::read_f32(&disk[37..41]), 198.0);
    }

    #[test]
    fn typed_round_trip() {
        let schema = Person::schema().unwrap();
        let batch: Vec<Person> = (0..300).map(person).collect();
        let disk = pack_records(&schema, &batch).unwrap();
        let back: Vec<Person> = unpack_records(&schema, &disk, batch.len()).unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn large_batch_matches_record_by_record() {
        let schema = Person::schema().unwrap();
        let batch: Vec<Person> = (0..5000).map(person).collect();
        let disk = pack_records(&schema, &batch).unwrap();
        assert_eq!(&disk[4999 * 41..], &pack_records(&schema, &batch[4999..]).unwrap()[..]);
        let back: Vec<Person> = unpack_records(&schema, &disk, batch.len()).unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn raw_buffers_zero_padding() {
        let schema = Person::schema().unwrap();
        let disk = pack_records(&schema, &[person(5)]).unwrap();
        let native = unpack_bytes(&schema, &disk, 1).unwrap();
        assert_eq!(native.len(), size_of::<Person>());
        assert_eq!(native[offset_of!(Person, age) + 1..offset_of!(Person, weight)], [0, 0, 0]);
        assert_eq!(pack_bytes(&schema, &native).unwrap(), disk);
    }

    #[test]
    fn long_string_truncates() {
        let mut b = SchemaBuilder::new();
        b.describe_field("label", FieldType::FixedString(4), 0, 10).unwrap();
        let schema = b.finalize(10).unwrap();
        let disk = pack_bytes(&schema, b"abcdefghij").unwrap();
        assert_eq!(disk, b"abcd");
        let native = unpack_bytes(&schema, &disk, 1).unwrap();
        assert_eq!(str_from_fixed(&native), "abcd");
        assert_eq!(native, b"abcd\0\0\0\0\0\0");
    }

    #[test]
    fn short_string_pads_with_zero() {
        let mut b = SchemaBuilder::new();
        b.describe_field("tag", FieldType::FixedString(6), 0, 2).unwrap();
        let schema = b.finalize(2).unwrap();
        assert_eq!(pack_bytes(&schema, b"hi").unwrap(), b"hi\0\0\0\0");
    }

    #[test]
    fn integer_width_saturates() {
        let mut b = SchemaBuilder::new();
        b.describe_field("small", FieldType::I8, 0, 8).unwrap();
        b.describe_field("tiny", FieldType::U8, 8, 4).unwrap();
        let schema = b.finalize(12).unwrap();

        let mut native = Vec::new();
        native.extend_from_slice(&(-1000i64).to_ne_bytes());
        native.extend_from_slice(&70000u32.to_ne_bytes());
        let disk = pack_bytes(&schema, &native).unwrap();
        assert_eq!(disk, vec![0x80, 0xFF]);

        let back = unpack_bytes(&schema, &disk, 1).unwrap();
        assert_eq!(i64::from_ne_bytes(back[..8].try_into().unwrap()), -128);
        assert_eq!(u32::from_ne_bytes(back[8..12].try_into().unwrap()), 255);
    }

    #[test]
    fn float_width_conversion() {
        let mut b = SchemaBuilder::new();
        b.describe_field("x", FieldType::F32, 0, 8).unwrap();
        let schema = b.finalize(8).unwrap();
        let disk = pack_bytes(&schema, &0.1f64.to_ne_bytes()).unwrap();
        assert_eq!(LittleEndian::read_f32(&disk), 0.1f32);
        let back = unpack_bytes(&schema, &disk, 1).unwrap();
        assert_eq!(f64::from_ne_bytes(back[..].try_into().unwrap()), 0.1f32 as f64);
    }

    #[test]
    fn stride_must_match_type() {
        let mut b = SchemaBuilder::new();
        b.describe_field("age", FieldType::U8, 0, 1).unwrap();
        let schema = b.finalize(2).unwrap();
        assert!(matches!(
            pack_records(&schema, &[person(0)]),
            Err(Error::StrideMismatch { expected: 2, .. })
        ));
    }

    #[test]
    fn schema_over_padding_is_refused() {
        // three bytes starting just past `age` run into the padding before `weight`
        let mut b = SchemaBuilder::new();
        b.describe_field("tail", FieldType::FixedString(3), offset_of!(Person, age) + 1, 3)
            .unwrap();
        let schema = b.finalize(size_of::<Person>()).unwrap();
        assert!(matches!(
            pack_records(&schema, &[person(0)]),
            Err(Error::FieldOutsideRecord { ref name, size: 3, .. }) if name == "tail"
        ));
        assert!(matches!(
            unpack_records::<Person>(&schema, &[0u8; 3], 1),
            Err(Error::FieldOutsideRecord { .. })
        ));
    }

    #[test]
    fn schema_straddling_fields_is_refused() {
        let mut b = SchemaBuilder::new();
        b.describe_field("mixed", FieldType::FixedString(8), offset_of!(Person, weight), 8)
            .unwrap();
        let schema = b.finalize(size_of::<Person>()).unwrap();
        assert!(matches!(
            pack_records(&schema, &[person(0)]),
            Err(Error::FieldOutsideRecord { offset, .. }) if offset == offset_of!(Person, weight)
        ));
    }

    #[test]
    fn schema_subset_of_fields_is_accepted() {
        let mut b = SchemaBuilder::new();
        b.describe_field("IQ", FieldType::F64, offset_of!(Person, iq), 4).unwrap();
        b.describe_field("age", FieldType::U8, offset_of!(Person, age), 1).unwrap();
        let schema = b.finalize(size_of::<Person>()).unwrap();
        let disk = pack_records(&schema, &[person(0)]).unwrap();
        assert_eq!(LittleEndian::read_f64(&disk[..8]), 198.0);
        assert_eq!(disk[8], 23);
        let back: Vec<Person> = unpack_records(&schema, &disk, 1).unwrap();
        assert_eq!((back[0].age, back[0].iq, back[0].weight), (23, 198.0, 0));
    }

    #[test]
    fn ragged_native_buffer() {
        let schema = Person::schema().unwrap();
        let native = vec![0u8; size_of::<Person>() + 3];
        assert!(matches!(pack_bytes(&schema, &native), Err(Error::BufferLength { .. })));
    }

    #[test]
    fn short_disk_buffer() {
        let schema = Person::schema().unwrap();
        assert!(matches!(
            unpack_records::<Person>(&schema, &[0u8; 60], 2),
            Err(Error::BufferLength { count: 2, record_size: 41, .. })
        ));
    }
}
