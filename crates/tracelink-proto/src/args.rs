//! Verbose-mode argument decoding and encoding.
//!
//! Each argument starts with a 32-bit type-info word (payload endianness)
//! that selects the kind and, for integers, the width. Strings and raw
//! blobs carry an additional 16-bit length. Type-info bits this codec does
//! not represent (arrays, structs, trace info, fixed-point and
//! variable-info annotations) are rejected so a frame is skipped instead
//! of silently misparsed.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::errors::{ArgumentError, EncodeError};

/// Width field of the type-info word (`1` = 8-bit … `4` = 64-bit).
pub const TYPE_LENGTH_MASK: u32 = 0x0000_000F;
/// Boolean argument.
pub const TYPE_BOOL: u32 = 0x0000_0010;
/// Signed integer argument.
pub const TYPE_SIGNED: u32 = 0x0000_0020;
/// Unsigned integer argument.
pub const TYPE_UNSIGNED: u32 = 0x0000_0040;
/// Floating-point argument.
pub const TYPE_FLOAT: u32 = 0x0000_0080;
/// Array of scalars (unsupported).
pub const TYPE_ARRAY: u32 = 0x0000_0100;
/// String argument.
pub const TYPE_STRING: u32 = 0x0000_0200;
/// Raw binary argument.
pub const TYPE_RAW: u32 = 0x0000_0400;
/// Variable name/unit annotation follows (unsupported).
pub const TYPE_VARIABLE_INFO: u32 = 0x0000_0800;
/// Fixed-point quantization follows (unsupported).
pub const TYPE_FIXED_POINT: u32 = 0x0000_1000;
/// Trace info argument (unsupported).
pub const TYPE_TRACE_INFO: u32 = 0x0000_2000;
/// Struct argument (unsupported).
pub const TYPE_STRUCT: u32 = 0x0000_4000;
/// String coding field.
pub const STRING_CODING_MASK: u32 = 0x0003_8000;
/// ASCII string coding.
pub const CODING_ASCII: u32 = 0x0000_0000;
/// UTF-8 string coding.
pub const CODING_UTF8: u32 = 0x0000_8000;

const UNSUPPORTED_BITS: u32 =
    TYPE_ARRAY | TYPE_VARIABLE_INFO | TYPE_FIXED_POINT | TYPE_TRACE_INFO | TYPE_STRUCT;

/// Integer width selected by the type-info length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntWidth {
    /// 8-bit value.
    Bits8,
    /// 16-bit value.
    Bits16,
    /// 32-bit value.
    Bits32,
    /// 64-bit value.
    Bits64,
}

impl IntWidth {
    fn from_type_info(type_info: u32) -> Option<Self> {
        match type_info & TYPE_LENGTH_MASK {
            1 => Some(Self::Bits8),
            2 => Some(Self::Bits16),
            3 => Some(Self::Bits32),
            4 => Some(Self::Bits64),
            _ => None,
        }
    }

    fn length_bits(self) -> u32 {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
            Self::Bits32 => 3,
            Self::Bits64 => 4,
        }
    }

    /// Encoded size of a value of this width.
    pub fn byte_len(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }
}

/// String coding of a verbose string argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringCoding {
    /// 7-bit ASCII.
    Ascii,
    /// UTF-8.
    Utf8,
}

/// One decoded verbose-mode argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// Boolean flag.
    Bool(bool),
    /// Unsigned integer of the declared width.
    Unsigned {
        /// The value, widened to 64 bits.
        value: u64,
        /// Width on the wire.
        width: IntWidth,
    },
    /// Signed integer of the declared width.
    Signed {
        /// The value, sign-extended to 64 bits.
        value: i64,
        /// Width on the wire.
        width: IntWidth,
    },
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// Text with a declared coding; the wire form carries a trailing NUL.
    String {
        /// Decoded text, terminator stripped.
        text: String,
        /// Declared coding.
        coding: StringCoding,
    },
    /// Opaque binary blob.
    Raw(Bytes),
}

impl Argument {
    /// Decode one argument from the front of `buf`.
    ///
    /// Returns the argument and the number of bytes consumed. `big_endian`
    /// is the payload byte order from the standard-header flags.
    pub fn decode(buf: &[u8], big_endian: bool) -> Result<(Self, usize), ArgumentError> {
        let type_info = read_u32(buf, big_endian).ok_or(ArgumentError::TruncatedTypeInfo)?;
        let mut offset = 4;
        let body = &buf[offset..];

        if type_info & UNSUPPORTED_BITS != 0 {
            return Err(ArgumentError::Unsupported { type_info });
        }

        let argument = if type_info & TYPE_STRING != 0 {
            let coding = match type_info & STRING_CODING_MASK {
                CODING_ASCII => StringCoding::Ascii,
                CODING_UTF8 => StringCoding::Utf8,
                _ => return Err(ArgumentError::UnsupportedCoding { type_info }),
            };
            let (bytes, consumed) = read_length_prefixed(body, big_endian)?;
            offset += consumed;
            // The declared length includes the terminating NUL.
            let text = bytes
                .split_last()
                .filter(|&(last, _)| *last == 0)
                .map(|(_, init)| init)
                .ok_or(ArgumentError::InvalidString)?;
            let text =
                std::str::from_utf8(text).map_err(|_| ArgumentError::InvalidString)?;
            Self::String { text: text.to_owned(), coding }
        } else if type_info & TYPE_RAW != 0 {
            let (bytes, consumed) = read_length_prefixed(body, big_endian)?;
            offset += consumed;
            Self::Raw(Bytes::copy_from_slice(bytes))
        } else if type_info & TYPE_BOOL != 0 {
            let byte = body.first().ok_or(ArgumentError::LengthOverflow {
                declared: 1,
                available: 0,
            })?;
            offset += 1;
            Self::Bool(*byte != 0)
        } else if type_info & TYPE_UNSIGNED != 0 {
            let width = IntWidth::from_type_info(type_info)
                .ok_or(ArgumentError::UnsupportedWidth { type_info })?;
            let value = read_uint(body, width, big_endian)?;
            offset += width.byte_len();
            Self::Unsigned { value, width }
        } else if type_info & TYPE_SIGNED != 0 {
            let width = IntWidth::from_type_info(type_info)
                .ok_or(ArgumentError::UnsupportedWidth { type_info })?;
            let value = read_uint(body, width, big_endian)?;
            offset += width.byte_len();
            Self::Signed { value: sign_extend(value, width), width }
        } else if type_info & TYPE_FLOAT != 0 {
            match IntWidth::from_type_info(type_info) {
                Some(IntWidth::Bits32) => {
                    let bits = read_uint(body, IntWidth::Bits32, big_endian)? as u32;
                    offset += 4;
                    Self::Float32(f32::from_bits(bits))
                }
                Some(IntWidth::Bits64) => {
                    let bits = read_uint(body, IntWidth::Bits64, big_endian)?;
                    offset += 8;
                    Self::Float64(f64::from_bits(bits))
                }
                _ => return Err(ArgumentError::UnsupportedWidth { type_info }),
            }
        } else {
            return Err(ArgumentError::Unsupported { type_info });
        };

        Ok((argument, offset))
    }

    /// Append the wire form of this argument to `out`.
    pub fn encode(&self, out: &mut BytesMut, big_endian: bool) -> Result<(), EncodeError> {
        let type_info = self.type_info();
        put_u32(out, type_info, big_endian);

        match self {
            Self::Bool(value) => out.put_u8(u8::from(*value)),
            Self::Unsigned { value, width } => put_uint(out, *value, *width, big_endian),
            Self::Signed { value, width } => put_uint(out, *value as u64, *width, big_endian),
            Self::Float32(value) => put_uint(out, u64::from(value.to_bits()), IntWidth::Bits32, big_endian),
            Self::Float64(value) => put_uint(out, value.to_bits(), IntWidth::Bits64, big_endian),
            Self::String { text, .. } => {
                let len = text.len() + 1;
                let declared =
                    u16::try_from(len).map_err(|_| EncodeError::ArgumentTooLarge { len })?;
                put_u16(out, declared, big_endian);
                out.put_slice(text.as_bytes());
                out.put_u8(0);
            }
            Self::Raw(bytes) => {
                let declared = u16::try_from(bytes.len())
                    .map_err(|_| EncodeError::ArgumentTooLarge { len: bytes.len() })?;
                put_u16(out, declared, big_endian);
                out.put_slice(bytes);
            }
        }
        Ok(())
    }

    /// Type-info word describing this argument.
    pub fn type_info(&self) -> u32 {
        match self {
            Self::Bool(_) => TYPE_BOOL | IntWidth::Bits8.length_bits(),
            Self::Unsigned { width, .. } => TYPE_UNSIGNED | width.length_bits(),
            Self::Signed { width, .. } => TYPE_SIGNED | width.length_bits(),
            Self::Float32(_) => TYPE_FLOAT | IntWidth::Bits32.length_bits(),
            Self::Float64(_) => TYPE_FLOAT | IntWidth::Bits64.length_bits(),
            Self::String { coding: StringCoding::Ascii, .. } => TYPE_STRING | CODING_ASCII,
            Self::String { coding: StringCoding::Utf8, .. } => TYPE_STRING | CODING_UTF8,
            Self::Raw(_) => TYPE_RAW,
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Unsigned { value, .. } => write!(f, "{value}"),
            Self::Signed { value, .. } => write!(f, "{value}"),
            Self::Float32(value) => write!(f, "{value}"),
            Self::Float64(value) => write!(f, "{value}"),
            Self::String { text, .. } => f.write_str(text),
            Self::Raw(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

fn read_u32(buf: &[u8], big_endian: bool) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(if big_endian {
        u32::from_be_bytes(bytes)
    } else {
        u32::from_le_bytes(bytes)
    })
}

fn read_u16(buf: &[u8], big_endian: bool) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(..2)?.try_into().ok()?;
    Some(if big_endian {
        u16::from_be_bytes(bytes)
    } else {
        u16::from_le_bytes(bytes)
    })
}

fn read_uint(buf: &[u8], width: IntWidth, big_endian: bool) -> Result<u64, ArgumentError> {
    let len = width.byte_len();
    let bytes = buf.get(..len).ok_or(ArgumentError::LengthOverflow {
        declared: len,
        available: buf.len(),
    })?;
    let mut value = 0u64;
    if big_endian {
        for &byte in bytes {
            value = (value << 8) | u64::from(byte);
        }
    } else {
        for &byte in bytes.iter().rev() {
            value = (value << 8) | u64::from(byte);
        }
    }
    Ok(value)
}

fn sign_extend(value: u64, width: IntWidth) -> i64 {
    match width {
        IntWidth::Bits8 => i64::from(value as u8 as i8),
        IntWidth::Bits16 => i64::from(value as u16 as i16),
        IntWidth::Bits32 => i64::from(value as u32 as i32),
        IntWidth::Bits64 => value as i64,
    }
}

/// Read a u16-length-prefixed value, returning the value bytes and the
/// total consumed (prefix included).
fn read_length_prefixed(buf: &[u8], big_endian: bool) -> Result<(&[u8], usize), ArgumentError> {
    let declared = read_u16(buf, big_endian).ok_or(ArgumentError::LengthOverflow {
        declared: 2,
        available: buf.len(),
    })? as usize;
    let bytes = buf
        .get(2..2 + declared)
        .ok_or(ArgumentError::LengthOverflow {
            declared,
            available: buf.len().saturating_sub(2),
        })?;
    Ok((bytes, 2 + declared))
}

fn put_u32(out: &mut BytesMut, value: u32, big_endian: bool) {
    if big_endian {
        out.put_u32(value);
    } else {
        out.put_u32_le(value);
    }
}

fn put_u16(out: &mut BytesMut, value: u16, big_endian: bool) {
    if big_endian {
        out.put_u16(value);
    } else {
        out.put_u16_le(value);
    }
}

fn put_uint(out: &mut BytesMut, value: u64, width: IntWidth, big_endian: bool) {
    let len = width.byte_len();
    let bytes = if big_endian {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    };
    if big_endian {
        out.put_slice(&bytes[8 - len..]);
    } else {
        out.put_slice(&bytes[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn round_trip(argument: Argument, big_endian: bool) {
        let mut out = BytesMut::new();
        argument.encode(&mut out, big_endian).unwrap();
        let (decoded, consumed) = Argument::decode(&out, big_endian).unwrap();
        assert_eq!(consumed, out.len());
        assert_eq!(decoded, argument);
    }

    #[test]
    fn string_argument_from_wire_bytes() {
        // type-info STRG|UTF8, length 6, "hello\0"
        let buf = hex!("00 82 00 00" "06 00" "68 65 6c 6c 6f 00");
        let (argument, consumed) = Argument::decode(&buf, false).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(
            argument,
            Argument::String { text: "hello".to_owned(), coding: StringCoding::Utf8 }
        );
    }

    #[test]
    fn unsigned_argument_respects_payload_endianness() {
        // type-info UINT|32-bit, value 0x0102_0304
        let little = hex!("43 00 00 00" "04 03 02 01");
        let big = hex!("00 00 00 43" "01 02 03 04");
        for (buf, big_endian) in [(&little, false), (&big, true)] {
            let (argument, _) = Argument::decode(buf.as_slice(), big_endian).unwrap();
            assert_eq!(
                argument,
                Argument::Unsigned { value: 0x0102_0304, width: IntWidth::Bits32 }
            );
        }
    }

    #[test]
    fn signed_argument_sign_extends() {
        let buf = hex!("22 00 00 00" "ff ff"); // SINT|16-bit, -1
        let (argument, _) = Argument::decode(&buf, false).unwrap();
        assert_eq!(argument, Argument::Signed { value: -1, width: IntWidth::Bits16 });
    }

    #[test]
    fn all_kinds_round_trip_in_both_byte_orders() {
        let arguments = [
            Argument::Bool(true),
            Argument::Bool(false),
            Argument::Unsigned { value: u64::MAX, width: IntWidth::Bits64 },
            Argument::Unsigned { value: 200, width: IntWidth::Bits8 },
            Argument::Signed { value: -40_000, width: IntWidth::Bits32 },
            Argument::Float32(1.5),
            Argument::Float64(-2.25),
            Argument::String { text: String::new(), coding: StringCoding::Ascii },
            Argument::String { text: "käse".to_owned(), coding: StringCoding::Utf8 },
            Argument::Raw(Bytes::from_static(&[0, 1, 2, 0xFF])),
        ];
        for argument in arguments {
            round_trip(argument.clone(), false);
            round_trip(argument, true);
        }
    }

    #[test]
    fn unsupported_type_info_is_rejected() {
        for type_info in [TYPE_ARRAY | 1, TYPE_STRUCT, TYPE_UNSIGNED | TYPE_VARIABLE_INFO | 1] {
            let mut buf = BytesMut::new();
            put_u32(&mut buf, type_info, false);
            buf.extend_from_slice(&[0u8; 8]);
            assert!(matches!(
                Argument::decode(&buf, false),
                Err(ArgumentError::Unsupported { .. })
            ));
        }
    }

    #[test]
    fn oversized_declared_length_is_rejected() {
        // STRG declaring 100 bytes with only 3 present
        let buf = hex!("00 02 00 00" "64 00" "61 62 00");
        assert!(matches!(
            Argument::decode(&buf, false),
            Err(ArgumentError::LengthOverflow { declared: 100, .. })
        ));
    }

    #[test]
    fn integer_width_128_is_rejected() {
        let buf = hex!("45 00 00 00" "00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00");
        assert!(matches!(
            Argument::decode(&buf, false),
            Err(ArgumentError::UnsupportedWidth { .. })
        ));
    }

    #[test]
    fn string_without_terminator_is_rejected() {
        let buf = hex!("00 02 00 00" "02 00" "61 62");
        assert!(matches!(Argument::decode(&buf, false), Err(ArgumentError::InvalidString)));
    }
}
