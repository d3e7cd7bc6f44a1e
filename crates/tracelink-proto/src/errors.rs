//! Error types for frame decoding and encoding.

use thiserror::Error;

/// Errors produced while decoding a single frame.
///
/// Every variant is recoverable at the stream level: the caller skips the
/// offending frame and resumes with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame does not begin with the storage pattern of the active
    /// profile.
    #[error("frame does not start with the storage pattern (found {found:02x?})")]
    BadPattern {
        /// The four bytes found where the pattern was expected.
        found: [u8; 4],
    },

    /// The declared frame length exceeds the bytes available.
    #[error("truncated frame: {needed} bytes declared, {available} available")]
    TruncatedFrame {
        /// Bytes required by the headers' declared lengths.
        needed: usize,
        /// Bytes actually supplied.
        available: usize,
    },

    /// The buffer holds more bytes than the headers declare.
    ///
    /// `decode` expects exactly one frame; trailing input indicates a
    /// framing bug in the caller.
    #[error("buffer is {actual} bytes but the frame declares {declared}")]
    LengthMismatch {
        /// Declared total frame size, storage header included.
        declared: usize,
        /// Size of the supplied buffer.
        actual: usize,
    },

    /// The standard header carries a version the active profile does not
    /// support.
    #[error("unsupported header version {version}")]
    UnknownVersion {
        /// Version bits extracted from the header type field.
        version: u8,
    },

    /// A verbose-mode argument could not be decoded.
    #[error("malformed argument {index}")]
    MalformedArgument {
        /// Zero-based index of the offending argument.
        index: usize,
        /// What went wrong with the argument.
        source: ArgumentError,
    },
}

/// Errors produced while decoding one verbose-mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// Fewer than four bytes remained for the type-info word.
    #[error("truncated type-info word")]
    TruncatedTypeInfo,

    /// The type-info word selects a kind this codec does not represent
    /// (arrays, structs, trace info, fixed-point or variable-info bits).
    #[error("unsupported type-info word {type_info:#010x}")]
    Unsupported {
        /// The raw type-info word.
        type_info: u32,
    },

    /// The declared integer width is not 8, 16, 32 or 64 bits.
    #[error("unsupported value width in type-info word {type_info:#010x}")]
    UnsupportedWidth {
        /// The raw type-info word.
        type_info: u32,
    },

    /// The declared string coding is neither ASCII nor UTF-8.
    #[error("unsupported string coding in type-info word {type_info:#010x}")]
    UnsupportedCoding {
        /// The raw type-info word.
        type_info: u32,
    },

    /// The argument value extends past the end of the payload.
    #[error("declared length {declared} overflows remaining payload ({available} bytes)")]
    LengthOverflow {
        /// Bytes the argument claims to occupy.
        declared: usize,
        /// Bytes left in the payload.
        available: usize,
    },

    /// A string argument declared a zero length or carried invalid UTF-8.
    #[error("invalid string data")]
    InvalidString,
}

/// Errors produced while encoding a [`crate::Message`] back to bytes.
///
/// Encoding only fails for messages that cannot be represented on the wire;
/// every decoded message re-encodes successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The encoded message would exceed the 16-bit length field.
    #[error("encoded frame would be {len} bytes, exceeding the length field")]
    FrameTooLarge {
        /// Encoded length excluding the storage header.
        len: usize,
    },

    /// Verbose mode carries more arguments than the 8-bit count field holds.
    #[error("{count} arguments exceed the 8-bit argument count")]
    TooManyArguments {
        /// Number of arguments supplied.
        count: usize,
    },

    /// A string or raw argument exceeds its 16-bit length field.
    #[error("argument of {len} bytes exceeds the 16-bit length field")]
    ArgumentTooLarge {
        /// Byte length of the offending argument value.
        len: usize,
    },

    /// The header version field only holds three bits.
    #[error("version {version} does not fit the 3-bit header field")]
    VersionOutOfRange {
        /// Supplied version value.
        version: u8,
    },

    /// A verbose payload requires an extended header for the argument count.
    #[error("verbose payload without an extended header")]
    MissingExtendedHeader,
}

/// Error returned when parsing a [`crate::ShortId`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identifier `{0}` is longer than four bytes")]
pub struct ShortIdError(pub String);
