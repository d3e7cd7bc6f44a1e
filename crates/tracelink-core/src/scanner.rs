//! Frame boundary recovery over an undelimited byte stream.
//!
//! The transport delivers bytes with no outer framing, so frame boundaries
//! must be recovered from the frames themselves, and a corrupted frame must
//! not take the stream down with it.
//!
//! # State machine
//!
//! ```text
//! ┌───────────┐  pattern + plausible length   ┌───────────┐
//! │ SeekSync  │──────────────────────────────>│ ReadBody  │
//! └───────────┘                               └───────────┘
//!       ▲        implausible header: skip 1 byte    │
//!       └──────────────────────────────────────────-┘
//!                      frame complete: emit
//! ```
//!
//! A candidate frame start is the profile's storage pattern followed by a
//! standard header whose declared length is plausible. Anything else
//! advances the scan by a single byte, so the scanner re-locks onto the
//! next genuine frame no matter how the corruption is aligned. Skipped
//! bytes are reported as one [`ScanEvent::Resync`] when sync is
//! reacquired.

use bytes::{Bytes, BytesMut};
use tracelink_proto::{DecodingProfile, StandardHeader, StorageHeader};

/// Output of one scanner step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// One complete frame, storage header through payload.
    Frame(Bytes),
    /// Sync was reacquired after skipping corrupted input.
    Resync {
        /// Bytes discarded since the last frame.
        skipped: usize,
    },
}

/// Leftover input reported when the stream closes mid-frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncompleteTail {
    /// Bytes buffered when the stream ended.
    pub buffered: usize,
    /// Bytes skipped without ever reacquiring sync.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    SeekSync,
    ReadBody { total: usize },
}

/// Incremental frame scanner; the mutable cursor of the ingestion pipeline.
///
/// Feed bytes with [`extend`](Self::extend), drain events with
/// [`next_event`](Self::next_event). The emitted frame sequence is lazy,
/// unbounded and non-restartable.
#[derive(Debug)]
pub struct FrameScanner {
    profile: DecodingProfile,
    buf: BytesMut,
    state: ScanState,
    pending_skipped: usize,
}

impl FrameScanner {
    /// Create a scanner for the given profile.
    pub fn new(profile: DecodingProfile) -> Self {
        Self {
            profile,
            buf: BytesMut::new(),
            state: ScanState::SeekSync,
            pending_skipped: 0,
        }
    }

    /// Append freshly received bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes currently buffered but not yet emitted.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pull the next event, or `None` when more input is needed.
    pub fn next_event(&mut self) -> Option<ScanEvent> {
        loop {
            match self.state {
                ScanState::SeekSync => {
                    if !self.seek_sync()? {
                        continue;
                    }
                    // Sync reacquired; report what was lost first.
                    if self.pending_skipped > 0 {
                        let skipped = std::mem::take(&mut self.pending_skipped);
                        return Some(ScanEvent::Resync { skipped });
                    }
                }
                ScanState::ReadBody { total } => {
                    if self.buf.len() < total {
                        return None;
                    }
                    let frame = self.buf.split_to(total).freeze();
                    self.state = ScanState::SeekSync;
                    return Some(ScanEvent::Frame(frame));
                }
            }
        }
    }

    /// Report and drop any partial input at end of stream.
    ///
    /// After this the scanner is empty; a reconnected stream should instead
    /// go through [`reset`](Self::reset).
    pub fn finish(&mut self) -> Option<IncompleteTail> {
        let buffered = self.buf.len();
        let skipped = std::mem::take(&mut self.pending_skipped);
        self.buf.clear();
        self.state = ScanState::SeekSync;
        (buffered > 0 || skipped > 0).then_some(IncompleteTail { buffered, skipped })
    }

    /// Drop all buffered state, e.g. after a transport reconnect.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = ScanState::SeekSync;
        self.pending_skipped = 0;
    }

    /// Advance the SeekSync state.
    ///
    /// Returns `Some(true)` when a plausible header was locked (state moved
    /// to ReadBody), `Some(false)` to continue scanning, `None` when more
    /// input is needed.
    fn seek_sync(&mut self) -> Option<bool> {
        let pattern = self.profile.storage_pattern;
        match find_pattern(&self.buf, &pattern) {
            Some(pos) => {
                if pos > 0 {
                    let _ = self.buf.split_to(pos);
                    self.pending_skipped += pos;
                }
                if self.buf.len() < StorageHeader::SIZE + StandardHeader::SIZE {
                    return None;
                }
                let standard = StandardHeader::read(&self.buf[StorageHeader::SIZE..])?;
                let declared = standard.len.get() as usize;
                let total = StorageHeader::SIZE + declared;
                if declared < StandardHeader::SIZE || total > self.profile.max_frame_len as usize {
                    // Pattern bytes occurring inside garbage; step past the
                    // first byte and keep scanning.
                    let _ = self.buf.split_to(1);
                    self.pending_skipped += 1;
                    return Some(false);
                }
                self.state = ScanState::ReadBody { total };
                Some(true)
            }
            None => {
                // No pattern: drop everything except a possible prefix of
                // one at the very end.
                let keep = self.buf.len().min(pattern.len() - 1);
                let drop_len = self.buf.len() - keep;
                if drop_len > 0 {
                    let _ = self.buf.split_to(drop_len);
                    self.pending_skipped += drop_len;
                }
                None
            }
        }
    }
}

fn find_pattern(haystack: &[u8], needle: &[u8; 4]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
