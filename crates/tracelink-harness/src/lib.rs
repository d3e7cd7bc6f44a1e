//! Deterministic test doubles for the tracelink pipeline.
//!
//! [`ScriptedTransport`] replays a pre-built byte stream in configurable
//! chunk sizes; [`ChannelTransport`] lets a test feed bytes live while the
//! broker runs. The [`corpus`] module builds well-formed and corrupted
//! frames without hand-writing wire bytes in every test.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod corpus;
pub mod transport;

pub use corpus::{garbage, log_frame, log_message};
pub use transport::{ChannelTransport, ScriptedTransport};
