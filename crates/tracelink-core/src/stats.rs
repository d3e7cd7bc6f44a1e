//! Pipeline diagnostic counters.
//!
//! The ingestion task increments these; any thread may snapshot them. None
//! of them feed back into pipeline behavior: they exist so operators can
//! see recovered corruption, skipped frames and storage degradation without
//! the pipeline ever surfacing those as failures.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracelink_proto::{DecodeError, Message};

/// Shared atomic counters, owned by the broker and its ingestion task.
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    frames_decoded: AtomicU64,
    resyncs: AtomicU64,
    skipped_bytes: AtomicU64,
    truncated_frames: AtomicU64,
    unknown_version_frames: AtomicU64,
    malformed_payloads: AtomicU64,
    rejected_frames: AtomicU64,
    frames_persisted: AtomicU64,
    storage_failures: AtomicU64,
    reconnects: AtomicU64,
    storage_degraded: AtomicBool,
    /// Storage timestamp of the newest message, in microseconds since the
    /// epoch; zero means "no message yet".
    latest_timestamp_micros: AtomicU64,
}

impl PipelineCounters {
    pub(crate) fn record_message(&self, message: &Message) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        let micros = u64::from(message.timestamp_seconds()) * 1_000_000
            + message.timestamp_microseconds().max(0) as u64;
        self.latest_timestamp_micros.store(micros, Ordering::Relaxed);
    }

    pub(crate) fn record_resync(&self, skipped: usize) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
        self.skipped_bytes.fetch_add(skipped as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_error(&self, error: &DecodeError) {
        match error {
            DecodeError::TruncatedFrame { .. } => &self.truncated_frames,
            DecodeError::UnknownVersion { .. } => &self.unknown_version_frames,
            DecodeError::MalformedArgument { .. } => &self.malformed_payloads,
            DecodeError::BadPattern { .. } | DecodeError::LengthMismatch { .. } => {
                &self.rejected_frames
            }
        }
        .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persisted(&self) {
        self.frames_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_storage_failure(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
        self.storage_degraded.store(true, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn latest_timestamp(&self) -> Option<SystemTime> {
        let micros = self.latest_timestamp_micros.load(Ordering::Relaxed);
        (micros > 0).then(|| UNIX_EPOCH + Duration::from_micros(micros))
    }

    pub(crate) fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            skipped_bytes: self.skipped_bytes.load(Ordering::Relaxed),
            truncated_frames: self.truncated_frames.load(Ordering::Relaxed),
            unknown_version_frames: self.unknown_version_frames.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            rejected_frames: self.rejected_frames.load(Ordering::Relaxed),
            frames_persisted: self.frames_persisted.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            storage_degraded: self.storage_degraded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of the pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    /// Frames decoded into messages.
    pub frames_decoded: u64,
    /// Resynchronization events recovered by the scanner.
    pub resyncs: u64,
    /// Bytes discarded while resynchronizing.
    pub skipped_bytes: u64,
    /// Frames dropped because they were shorter than declared.
    pub truncated_frames: u64,
    /// Frames dropped for an unsupported header version.
    pub unknown_version_frames: u64,
    /// Frames dropped for undecodable verbose payloads.
    pub malformed_payloads: u64,
    /// Frames dropped for other decode failures.
    pub rejected_frames: u64,
    /// Frames appended to the trace file.
    pub frames_persisted: u64,
    /// Failed storage operations.
    pub storage_failures: u64,
    /// Transport reconnects performed by the ingestion task.
    pub reconnects: u64,
    /// True once persistence has failed; live delivery continues.
    pub storage_degraded: bool,
}

impl PipelineStats {
    /// Frames dropped by the decoder, all causes combined.
    pub fn decode_errors(&self) -> u64 {
        self.truncated_frames
            + self.unknown_version_frames
            + self.malformed_payloads
            + self.rejected_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let counters = PipelineCounters::default();
        let message = Message::builder().timestamp(100, 250_000).text("x").build();

        counters.record_message(&message);
        counters.record_resync(17);
        counters.record_decode_error(&DecodeError::UnknownVersion { version: 2 });
        counters.record_storage_failure();

        let stats = counters.snapshot();
        assert_eq!(stats.frames_decoded, 1);
        assert_eq!(stats.resyncs, 1);
        assert_eq!(stats.skipped_bytes, 17);
        assert_eq!(stats.unknown_version_frames, 1);
        assert_eq!(stats.decode_errors(), 1);
        assert!(stats.storage_degraded);

        let latest = counters.latest_timestamp().unwrap();
        assert_eq!(
            latest.duration_since(UNIX_EPOCH).unwrap(),
            Duration::new(100, 250_000_000)
        );
    }

    #[test]
    fn no_messages_means_no_timestamp() {
        let counters = PipelineCounters::default();
        assert!(counters.latest_timestamp().is_none());
    }
}
