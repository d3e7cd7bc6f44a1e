//! Ready-made frames and messages for pipeline tests.

use bytes::Bytes;
use tracelink_proto::{encode, DecodingProfile, Message};

/// A verbose log message with the given ids and text.
///
/// The counter doubles as a distinguishable payload marker so tests can
/// assert ordering.
pub fn log_message(app_id: &str, context_id: &str, counter: u8, text: &str) -> Message {
    Message::builder()
        .ecu_id(parse_id("ECU1"))
        .ids(parse_id(app_id), parse_id(context_id))
        .counter(counter)
        .timestamp(1_700_000_000 + u32::from(counter), 0)
        .text(text)
        .build()
}

/// The wire frame of [`log_message`], encoded with the default profile.
pub fn log_frame(app_id: &str, context_id: &str, counter: u8, text: &str) -> Bytes {
    let message = log_message(app_id, context_id, counter, text);
    match encode(&message, &DecodingProfile::default()) {
        Ok(frame) => frame,
        // Corpus messages are tiny; the encoder cannot reject them.
        Err(_) => Bytes::new(),
    }
}

/// Bytes that contain no storage pattern and decode to nothing.
pub fn garbage(len: usize) -> Bytes {
    Bytes::from(vec![0x55u8; len])
}

fn parse_id(id: &str) -> tracelink_proto::ShortId {
    id.parse().unwrap_or_default()
}
