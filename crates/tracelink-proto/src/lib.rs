//! Wire format for DLT (Diagnostic Log and Trace) frames.
//!
//! Frames consist of a 16-byte storage header (zero-copy binary), a 4-byte
//! big-endian standard header, optional extra and extended header blocks
//! selected by flag bits, and a payload that is either an opaque blob
//! (non-verbose mode) or a self-describing sequence of typed arguments
//! (verbose mode).
//!
//! Decoding is pure: the only external input besides the bytes is an
//! immutable [`DecodingProfile`] chosen once per connection. The received
//! frame bytes are retained on every decoded [`Message`] so that persisting
//! a message never re-serializes it: what the daemon sent is exactly what
//! lands in the trace file.
//!
//! # Robustness
//!
//! All header parsing uses compile-time verified layouts via `zerocopy`.
//! Argument decoding never indexes past the declared frame length, and
//! type-info words this crate cannot represent are rejected as
//! [`errors::ArgumentError`] rather than misparsed.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod args;
pub mod codec;
pub mod errors;
pub mod flags;
pub mod header;
pub mod ident;
pub mod message;
pub mod profile;

pub use args::{Argument, IntWidth, StringCoding};
pub use codec::{decode, encode};
pub use errors::{ArgumentError, DecodeError, EncodeError, ShortIdError};
pub use flags::HeaderFlags;
pub use header::{ExtendedHeader, StandardHeader, StorageHeader};
pub use ident::ShortId;
pub use message::{ExtendedInfo, LogLevel, Message, MessageBuilder, MessageType, Payload};
pub use profile::DecodingProfile;
