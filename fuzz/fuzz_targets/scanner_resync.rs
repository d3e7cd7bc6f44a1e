//! Fuzz stream resynchronization: arbitrary input fed in arbitrary chunk
//! sizes must never panic, loop forever, or emit frames the decoder cannot
//! bound.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tracelink_core::{FrameScanner, ScanEvent};
use tracelink_proto::{decode, DecodingProfile};

fuzz_target!(|data: &[u8]| {
    let profile = DecodingProfile::default();
    let mut scanner = FrameScanner::new(profile);

    // First input byte doubles as the chunking seed.
    let chunk = data.first().copied().unwrap_or(1).max(1) as usize;
    for piece in data.chunks(chunk) {
        scanner.extend(piece);
        while let Some(event) = scanner.next_event() {
            if let ScanEvent::Frame(frame) = event {
                assert!(frame.len() <= profile.max_frame_len as usize);
                let _ = decode(&frame, &profile);
            }
        }
    }
    scanner.finish();
});
