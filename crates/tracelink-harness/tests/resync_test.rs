//! Corruption isolation: a damaged frame costs exactly that frame.

use std::time::Duration;

use tracelink_core::{Broker, BrokerConfig, FilterPredicate};
use tracelink_harness::{garbage, log_frame, ScriptedTransport};

/// Garbage between two valid frames is skipped: both frames are delivered,
/// both are persisted, and the resynchronization is counted.
#[tokio::test]
async fn corruption_between_frames_is_isolated() {
    let first = log_frame("SYS", "JOUR", 0, "before");
    let second = log_frame("SYS", "JOUR", 1, "after");
    let mut input = Vec::new();
    input.extend_from_slice(&first);
    input.extend_from_slice(&garbage(57));
    input.extend_from_slice(&second);

    let dir = tempfile::tempdir().unwrap();
    let trace_path = dir.path().join("vehicle.dlt");

    let mut broker = Broker::new(
        ScriptedTransport::chunked(&input, 11),
        BrokerConfig { trace_file: Some(trace_path.clone()), ..BrokerConfig::default() },
    );
    let mut sub = broker.subscribe(FilterPredicate::match_all()).unwrap();
    broker.start().unwrap();

    let messages = sub.wait_for(2, Duration::from_secs(5)).await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].counter(), 0);
    assert_eq!(messages[1].counter(), 1);

    broker.stop().await.unwrap();

    // Only the two whole frames were persisted, the garbage was not.
    let mut expected = Vec::new();
    expected.extend_from_slice(&first);
    expected.extend_from_slice(&second);
    assert_eq!(tokio::fs::read(&trace_path).await.unwrap(), expected);

    let stats = broker.stats();
    assert_eq!(stats.frames_decoded, 2);
    assert!(stats.resyncs >= 1);
    assert_eq!(stats.skipped_bytes, 57);
}

/// A frame whose header declares an unsupported version is dropped by the
/// decoder while its neighbors flow through.
#[tokio::test]
async fn unsupported_version_frame_is_skipped_and_counted() {
    let good_before = log_frame("SYS", "JOUR", 0, "ok");
    let good_after = log_frame("SYS", "JOUR", 1, "ok");

    let mut alien = log_frame("SYS", "JOUR", 9, "alien").to_vec();
    // Rewrite the version bits of the standard header (byte 16 of the frame).
    alien[16] = (alien[16] & 0x1F) | (3 << 5);

    let mut input = Vec::new();
    input.extend_from_slice(&good_before);
    input.extend_from_slice(&alien);
    input.extend_from_slice(&good_after);

    let mut broker = Broker::new(
        ScriptedTransport::chunked(&input, 16),
        BrokerConfig::default(),
    );
    let mut sub = broker.subscribe(FilterPredicate::match_all()).unwrap();
    broker.start().unwrap();

    let messages = sub.wait_for(2, Duration::from_secs(5)).await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].counter(), 0);
    assert_eq!(messages[1].counter(), 1);

    broker.stop().await.unwrap();
    let stats = broker.stats();
    assert_eq!(stats.unknown_version_frames, 1);
    assert_eq!(stats.frames_decoded, 2);
}

/// The stream closing mid-frame drops only the incomplete tail.
#[tokio::test]
async fn truncated_final_frame_is_dropped_cleanly() {
    let complete = log_frame("SYS", "JOUR", 0, "whole");
    let partial = log_frame("SYS", "JOUR", 1, "interrupted");

    let mut input = Vec::new();
    input.extend_from_slice(&complete);
    input.extend_from_slice(&partial[..partial.len() - 4]);

    let dir = tempfile::tempdir().unwrap();
    let trace_path = dir.path().join("vehicle.dlt");

    let mut broker = Broker::new(
        ScriptedTransport::chunked(&input, 32),
        BrokerConfig { trace_file: Some(trace_path.clone()), ..BrokerConfig::default() },
    );
    let mut sub = broker.subscribe(FilterPredicate::match_all()).unwrap();
    broker.start().unwrap();

    let messages = sub.wait_for(1, Duration::from_secs(5)).await;
    assert_eq!(messages.len(), 1);

    broker.stop().await.unwrap();
    assert_eq!(
        tokio::fs::read(&trace_path).await.unwrap(),
        complete.to_vec(),
        "only whole frames reach the trace file"
    );
}
