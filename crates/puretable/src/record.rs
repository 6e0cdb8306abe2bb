//! Native record types that can be packed through a [`Schema`].

use crate::error::Result;
use crate::schema::{FieldType, Schema};

/// A native struct whose values can be packed into and unpacked from table records.
///
/// Usually derived with `#[derive(Record)]`, which describes every field
/// with its real `offset_of!` and `size_of`, so padding the compiler
/// inserts is never read.
///
/// # Safety
///
/// Implementors guarantee that:
///
/// * every byte range described by [`Record::schema`] lies inside a single
///   field of `Self` (never inside padding), and
/// * `Self` is valid for the all-zero bit pattern and for any bit pattern
///   written into those field bytes.
///
/// Structs made only of [`NativeField`] types satisfy the second point.
/// Any other schema used with `Self` is checked against [`Record::schema`]
/// before a byte is read or written.
pub unsafe trait Record: Copy + Send + Sync + 'static {
    /// Schema mapping this struct's native layout onto a packed record.
    fn schema() -> Result<Schema>;
}

/// Plain scalar types with a natural on-disk field type.
///
/// # Safety
///
/// Every bit pattern of `size_of::<Self>()` bytes must be a valid `Self`.
pub unsafe trait NativeField: Copy + Send + Sync + 'static {
    const FIELD_TYPE: FieldType;
}

macro_rules! native_field {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            unsafe impl NativeField for $ty {
                const FIELD_TYPE: FieldType = FieldType::$field;
            }
        )*
    };
}

native_field! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

/// Byte arrays are fixed-length strings of the same length.
unsafe impl<const N: usize> NativeField for [u8; N] {
    const FIELD_TYPE: FieldType = FieldType::FixedString(N);
}

/// Copy `s` into a zero-filled fixed buffer, truncating to `N` bytes.
pub fn fixed_str<const N: usize>(s: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let n = s.len().min(N);
    buf[..n].copy_from_slice(&s.as_bytes()[..n]);
    buf
}

/// View a fixed string buffer up to its first NUL as text.
pub fn str_from_fixed(buf: &[u8]) -> std::borrow::Cow<'_, str> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end])
}
