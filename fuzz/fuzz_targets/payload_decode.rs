//! Fuzz verbose argument decoding in both byte orders.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tracelink_proto::Argument;

fuzz_target!(|data: &[u8]| {
    for big_endian in [false, true] {
        if let Ok((_, consumed)) = Argument::decode(data, big_endian) {
            assert!(consumed <= data.len());
        }
    }
});
