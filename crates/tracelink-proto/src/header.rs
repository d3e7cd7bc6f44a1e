//! Fixed header blocks of a frame, as zero-copy binary layouts.
//!
//! A frame on the wire (and in a trace file; the two are identical) is:
//!
//! ```text
//! ┌────────────────┬──────────────────┬─────────────┬──────────────────┬─────────┐
//! │ StorageHeader  │ StandardHeader   │ extra block │ ExtendedHeader   │ payload │
//! │ 16 B           │ 4 B, big-endian  │ 0–12 B      │ 10 B, optional   │         │
//! └────────────────┴──────────────────┴─────────────┴──────────────────┴─────────┘
//! ```
//!
//! The extra block carries an ECU id, session id and device timestamp, each
//! present only when its flag bit is set; it is parsed field-by-field in the
//! codec rather than as a fixed struct.

use zerocopy::byteorder::{BigEndian, LittleEndian, I32, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Default storage pattern marking the start of every frame.
pub const STORAGE_PATTERN: [u8; 4] = *b"DLT\x01";

/// Storage header: pattern, receive timestamp and ECU id.
///
/// Stamped by the daemon when the message is received, so unlike the rest of
/// the frame its integer fields are little-endian (host order of the
/// producer).
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
pub struct StorageHeader {
    /// Frame marker; must equal the active profile's pattern.
    pub pattern: [u8; 4],
    /// Seconds since the Unix epoch at receive time.
    pub seconds: U32<LittleEndian>,
    /// Sub-second part of the receive time.
    pub microseconds: I32<LittleEndian>,
    /// ECU the message was received from.
    pub ecu: [u8; 4],
}

impl StorageHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 16;

    /// Read a storage header from the start of `buf`, if it is long enough.
    pub fn read(buf: &[u8]) -> Option<Self> {
        Self::read_from_prefix(buf).ok().map(|(header, _)| header)
    }
}

/// Standard header: flag byte, message counter and declared length.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
pub struct StandardHeader {
    /// Header type: flag bits plus the 3-bit version (see [`crate::flags`]).
    pub htyp: u8,
    /// Producer message counter, wrapping.
    pub mcnt: u8,
    /// Total message length excluding the storage header.
    pub len: U16<BigEndian>,
}

impl StandardHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 4;

    /// Read a standard header from the start of `buf`, if it is long enough.
    pub fn read(buf: &[u8]) -> Option<Self> {
        Self::read_from_prefix(buf).ok().map(|(header, _)| header)
    }
}

/// Extended header: message info, argument count and filtering ids.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
pub struct ExtendedHeader {
    /// Message info byte: verbose bit, message type, subtype.
    pub msin: u8,
    /// Number of verbose arguments (zero in non-verbose mode).
    pub noar: u8,
    /// Application id.
    pub apid: [u8; 4],
    /// Context id.
    pub ctid: [u8; 4],
}

impl ExtendedHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 10;

    /// Read an extended header from the start of `buf`, if it is long enough.
    pub fn read(buf: &[u8]) -> Option<Self> {
        Self::read_from_prefix(buf).ok().map(|(header, _)| header)
    }
}
