//! Version-specific decoding constants.

use serde::{Deserialize, Serialize};

use crate::header::{StandardHeader, StorageHeader, STORAGE_PATTERN};

/// Constants that vary between daemon versions, fixed once per connection.
///
/// This is plain data on purpose: the codec and the frame scanner take it by
/// reference and never consult anything else, which keeps decoding a pure
/// function of the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodingProfile {
    /// Standard-header version this profile accepts.
    pub version: u8,
    /// Four-byte pattern marking the start of every frame.
    pub storage_pattern: [u8; 4],
    /// Upper bound on a plausible frame size, storage header included.
    ///
    /// Candidate headers declaring more than this are treated as corruption
    /// during resynchronization.
    pub max_frame_len: u32,
}

impl DecodingProfile {
    /// Smallest frame this profile considers plausible: storage header plus
    /// a bare standard header.
    pub const MIN_FRAME_LEN: usize = StorageHeader::SIZE + StandardHeader::SIZE;
}

impl Default for DecodingProfile {
    fn default() -> Self {
        Self {
            version: 1,
            storage_pattern: STORAGE_PATTERN,
            // The declared length field is 16 bits and excludes the storage
            // header.
            max_frame_len: StorageHeader::SIZE as u32 + u32::from(u16::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_accepts_full_length_range() {
        let profile = DecodingProfile::default();
        assert_eq!(profile.version, 1);
        assert_eq!(profile.storage_pattern, *b"DLT\x01");
        assert_eq!(profile.max_frame_len, 65_551);
    }
}
