//! Datatype messages describing the persisted record layout.
//!
//! The encoding follows the HDF5 datatype message (type 0x0003) for the
//! classes a record table needs: fixed-point (0), floating-point (1),
//! fixed-length string (3) and compound (6). Compound members are written
//! with version 3 (packed names, variable-width offsets).

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// Byte order of a numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatatypeByteOrder {
    LittleEndian,
    BigEndian,
}

/// String padding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringPadding {
    NullTerminate,
    NullPad,
    SpacePad,
}

/// Character set of a string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterSet {
    Ascii,
    Utf8,
}

/// One named member of a compound.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundMember {
    /// Member name.
    pub name: String,
    /// Byte offset within the packed compound.
    pub byte_offset: u64,
    /// Member datatype.
    pub datatype: Datatype,
}

/// Parsed datatype message.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    /// Integer.
    FixedPoint {
        size: u32,
        byte_order: DatatypeByteOrder,
        signed: bool,
        bit_offset: u16,
        bit_precision: u16,
    },
    /// IEEE float.
    FloatingPoint {
        size: u32,
        byte_order: DatatypeByteOrder,
        bit_offset: u16,
        bit_precision: u16,
        exponent_location: u8,
        exponent_size: u8,
        mantissa_location: u8,
        mantissa_size: u8,
        exponent_bias: u32,
    },
    /// Fixed-length string.
    String {
        size: u32,
        padding: StringPadding,
        charset: CharacterSet,
    },
    /// Record of named members.
    Compound {
        size: u32,
        members: Vec<CompoundMember>,
    },
}

const CLASS_FIXED_POINT: u8 = 0;
const CLASS_FLOATING_POINT: u8 = 1;
const CLASS_STRING: u8 = 3;
const CLASS_COMPOUND: u8 = 6;

/// Compound members are only encoded in message version 3.
const COMPOUND_VERSION: u8 = 3;
const SCALAR_VERSION: u8 = 1;

const BIG_ENDIAN_BIT: u8 = 0x01;
const SIGNED_BIT: u8 = 0x08;
/// IEEE mantissa normalization ("implied leading one"), bits 4-5.
const IEEE_NORMALIZED: u8 = 0x20;

impl StringPadding {
    fn code(self) -> u8 {
        match self {
            StringPadding::NullTerminate => 0,
            StringPadding::NullPad => 1,
            StringPadding::SpacePad => 2,
        }
    }

    fn from_code(code: u8) -> Result<Self, FormatError> {
        match code {
            0 => Ok(StringPadding::NullTerminate),
            1 => Ok(StringPadding::NullPad),
            2 => Ok(StringPadding::SpacePad),
            other => Err(FormatError::InvalidStringPadding(other)),
        }
    }
}

impl CharacterSet {
    fn code(self) -> u8 {
        match self {
            CharacterSet::Ascii => 0,
            CharacterSet::Utf8 => 1,
        }
    }

    fn from_code(code: u8) -> Result<Self, FormatError> {
        match code {
            0 => Ok(CharacterSet::Ascii),
            1 => Ok(CharacterSet::Utf8),
            other => Err(FormatError::InvalidCharacterSet(other)),
        }
    }
}

impl DatatypeByteOrder {
    fn from_flags(flags: u8) -> Self {
        if flags & BIG_ENDIAN_BIT == 0 {
            DatatypeByteOrder::LittleEndian
        } else {
            DatatypeByteOrder::BigEndian
        }
    }

    fn flag(self) -> u8 {
        match self {
            DatatypeByteOrder::LittleEndian => 0,
            DatatypeByteOrder::BigEndian => BIG_ENDIAN_BIT,
        }
    }
}

/// Width of a member offset inside a compound of `compound_size` bytes.
fn member_offset_width(compound_size: u32) -> usize {
    match compound_size {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        _ => 4,
    }
}

/// Bounds-checked little-endian reader over a message.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos + n;
        let bytes = self.data.get(self.pos..end).ok_or(FormatError::UnexpectedEof {
            expected: end,
            available: self.data.len(),
        })?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, FormatError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn u32(&mut self) -> Result<u32, FormatError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn uint(&mut self, width: usize) -> Result<u64, FormatError> {
        Ok(LittleEndian::read_uint(self.take(width)?, width))
    }

    /// NUL-terminated UTF-8 name; the terminator is consumed.
    fn name(&mut self) -> Result<String, FormatError> {
        let rest = self.data.get(self.pos..).unwrap_or(&[]);
        let len = rest.iter().position(|&b| b == 0).ok_or(FormatError::UnexpectedEof {
            expected: self.data.len() + 1,
            available: self.data.len(),
        })?;
        let name = std::str::from_utf8(&rest[..len]).map_err(|_| FormatError::InvalidName)?;
        self.pos += len + 1;
        Ok(name.to_string())
    }

    /// Nested message starting at the cursor.
    fn datatype(&mut self) -> Result<Datatype, FormatError> {
        let rest = self.data.get(self.pos..).unwrap_or(&[]);
        let (datatype, consumed) = Datatype::parse(rest)?;
        self.pos += consumed;
        Ok(datatype)
    }
}

/// The 8-byte header shared by every class: class and version nibbles,
/// three class bit-field bytes, element size.
fn header(class: u8, version: u8, flags: [u8; 3], size: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    buf.push((version << 4) | (class & 0x0F));
    buf.extend_from_slice(&flags);
    buf.extend_from_slice(&size.to_le_bytes());
    buf
}

impl Datatype {
    /// Parse a datatype message from raw bytes.
    ///
    /// Returns `(Datatype, bytes_consumed)` so compound members can be
    /// parsed recursively.
    pub fn parse(data: &[u8]) -> Result<(Datatype, usize), FormatError> {
        let mut cur = Cursor::new(data);
        let class_and_version = cur.u8()?;
        let flags = cur.take(3)?;
        let (f0, f1) = (flags[0], flags[1]);
        let size = cur.u32()?;
        let class = class_and_version & 0x0F;
        let version = class_and_version >> 4;

        let datatype = match class {
            CLASS_FIXED_POINT => Datatype::FixedPoint {
                size,
                byte_order: DatatypeByteOrder::from_flags(f0),
                signed: f0 & SIGNED_BIT != 0,
                bit_offset: cur.u16()?,
                bit_precision: cur.u16()?,
            },
            CLASS_FLOATING_POINT => Datatype::FloatingPoint {
                size,
                byte_order: DatatypeByteOrder::from_flags(f0),
                bit_offset: cur.u16()?,
                bit_precision: cur.u16()?,
                exponent_location: cur.u8()?,
                exponent_size: cur.u8()?,
                mantissa_location: cur.u8()?,
                mantissa_size: cur.u8()?,
                exponent_bias: cur.u32()?,
            },
            CLASS_STRING => Datatype::String {
                size,
                padding: StringPadding::from_code(f0 & 0x0F)?,
                charset: CharacterSet::from_code(f0 >> 4)?,
            },
            CLASS_COMPOUND => {
                if version != COMPOUND_VERSION {
                    return Err(FormatError::InvalidDatatypeVersion { class, version });
                }
                let count = u16::from_le_bytes([f0, f1]) as usize;
                let width = member_offset_width(size);
                let mut members = Vec::with_capacity(count);
                for _ in 0..count {
                    let name = cur.name()?;
                    let byte_offset = cur.uint(width)?;
                    let datatype = cur.datatype()?;
                    members.push(CompoundMember {
                        name,
                        byte_offset,
                        datatype,
                    });
                }
                Datatype::Compound { size, members }
            }
            other => return Err(FormatError::InvalidDatatypeClass(other)),
        };
        Ok((datatype, cur.pos))
    }

    /// Encode the datatype message.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Datatype::FixedPoint {
                size,
                byte_order,
                signed,
                bit_offset,
                bit_precision,
            } => {
                let f0 = byte_order.flag() | if *signed { SIGNED_BIT } else { 0 };
                let mut buf = header(CLASS_FIXED_POINT, SCALAR_VERSION, [f0, 0, 0], *size);
                buf.extend_from_slice(&bit_offset.to_le_bytes());
                buf.extend_from_slice(&bit_precision.to_le_bytes());
                buf
            }
            Datatype::FloatingPoint {
                size,
                byte_order,
                bit_offset,
                bit_precision,
                exponent_location,
                exponent_size,
                mantissa_location,
                mantissa_size,
                exponent_bias,
            } => {
                // second flag byte holds the sign bit position
                let sign_bit = bit_precision.saturating_sub(1) as u8;
                let f0 = IEEE_NORMALIZED | byte_order.flag();
                let mut buf = header(CLASS_FLOATING_POINT, SCALAR_VERSION, [f0, sign_bit, 0], *size);
                buf.extend_from_slice(&bit_offset.to_le_bytes());
                buf.extend_from_slice(&bit_precision.to_le_bytes());
                buf.extend_from_slice(&[*exponent_location, *exponent_size, *mantissa_location, *mantissa_size]);
                buf.extend_from_slice(&exponent_bias.to_le_bytes());
                buf
            }
            Datatype::String { size, padding, charset } => {
                let f0 = padding.code() | (charset.code() << 4);
                header(CLASS_STRING, SCALAR_VERSION, [f0, 0, 0], *size)
            }
            Datatype::Compound { size, members } => {
                let [lo, hi] = (members.len() as u16).to_le_bytes();
                let mut buf = header(CLASS_COMPOUND, COMPOUND_VERSION, [lo, hi, 0], *size);
                let width = member_offset_width(*size);
                for member in members {
                    buf.extend_from_slice(member.name.as_bytes());
                    buf.push(0);
                    buf.extend_from_slice(&member.byte_offset.to_le_bytes()[..width]);
                    buf.extend(member.datatype.serialize());
                }
                buf
            }
        }
    }

    /// Size in bytes of one element of this type.
    pub fn type_size(&self) -> u32 {
        match self {
            Datatype::FixedPoint { size, .. }
            | Datatype::FloatingPoint { size, .. }
            | Datatype::String { size, .. }
            | Datatype::Compound { size, .. } => *size,
        }
    }

    /// Members of a compound type, or `None` for scalar classes.
    pub fn members(&self) -> Option<&[CompoundMember]> {
        match self {
            Datatype::Compound { members, .. } => Some(members),
            _ => None,
        }
    }
}

/// Little-endian IEEE single precision.
pub fn make_f32_type() -> Datatype {
    Datatype::FloatingPoint {
        size: 4,
        byte_order: DatatypeByteOrder::LittleEndian,
        bit_offset: 0,
        bit_precision: 32,
        exponent_location: 23,
        exponent_size: 8,
        mantissa_location: 0,
        mantissa_size: 23,
        exponent_bias: 127,
    }
}

/// Little-endian IEEE double precision.
pub fn make_f64_type() -> Datatype {
    Datatype::FloatingPoint {
        size: 8,
        byte_order: DatatypeByteOrder::LittleEndian,
        bit_offset: 0,
        bit_precision: 64,
        exponent_location: 52,
        exponent_size: 11,
        mantissa_location: 0,
        mantissa_size: 52,
        exponent_bias: 1023,
    }
}

/// Little-endian integer of `size` bytes.
pub fn make_int_type(size: u32, signed: bool) -> Datatype {
    Datatype::FixedPoint {
        size,
        byte_order: DatatypeByteOrder::LittleEndian,
        signed,
        bit_offset: 0,
        bit_precision: (size * 8) as u16,
    }
}

/// Null-padded ASCII string of `size` bytes.
pub fn make_fixed_string_type(size: u32) -> Datatype {
    Datatype::String {
        size,
        padding: StringPadding::NullPad,
        charset: CharacterSet::Ascii,
    }
}
