//! Standard-header type flags.
//!
//! The low five bits of the header type byte select which optional blocks
//! follow the standard header; the top three bits carry the protocol
//! version.

use bitflags::bitflags;

bitflags! {
    /// Flag bits of the standard-header `htyp` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        /// An extended header follows the extra block.
        const EXTENDED = 0x01;
        /// Payload (and only the payload) is big-endian.
        const BIG_ENDIAN = 0x02;
        /// The extra block carries an ECU id.
        const WITH_ECU = 0x04;
        /// The extra block carries a session id.
        const WITH_SESSION = 0x08;
        /// The extra block carries a device timestamp.
        const WITH_TIMESTAMP = 0x10;
    }
}

/// Bit offset of the version field within `htyp`.
const VERSION_SHIFT: u8 = 5;

/// Largest value representable in the 3-bit version field.
pub const MAX_VERSION: u8 = 0x07;

/// Split a raw `htyp` byte into flags and version.
pub fn split_htyp(htyp: u8) -> (HeaderFlags, u8) {
    (
        HeaderFlags::from_bits_truncate(htyp),
        htyp >> VERSION_SHIFT,
    )
}

/// Combine flags and a version into a raw `htyp` byte.
///
/// The version must already be validated against [`MAX_VERSION`].
pub fn join_htyp(flags: HeaderFlags, version: u8) -> u8 {
    flags.bits() | (version << VERSION_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn htyp_round_trip() {
        let flags = HeaderFlags::EXTENDED | HeaderFlags::WITH_ECU | HeaderFlags::WITH_TIMESTAMP;
        let htyp = join_htyp(flags, 1);
        assert_eq!(htyp, 0x35);
        assert_eq!(split_htyp(htyp), (flags, 1));
    }

    #[test]
    fn version_bits_do_not_leak_into_flags() {
        let (flags, version) = split_htyp(0xE0);
        assert!(flags.is_empty());
        assert_eq!(version, 7);
    }
}
