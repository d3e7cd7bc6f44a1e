//! Fuzz the frame decoder: arbitrary bytes must never panic, and every
//! successfully decoded message must survive an encode/decode round trip.
//!
//! Stability is asserted on the re-encoded bytes rather than on message
//! equality so NaN float arguments do not trip the comparison.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tracelink_proto::{decode, encode, DecodingProfile};

fuzz_target!(|data: &[u8]| {
    let profile = DecodingProfile::default();
    if let Ok(message) = decode(data, &profile) {
        let encoded = encode(&message, &profile).expect("decoded messages must re-encode");
        let again = decode(&encoded, &profile).expect("re-encoded frames must decode");
        let re_encoded = encode(&again, &profile).expect("round trip must stay encodable");
        assert_eq!(encoded, re_encoded);
    }
});
