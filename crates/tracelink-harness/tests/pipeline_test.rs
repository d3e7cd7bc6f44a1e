//! End-to-end pipeline tests: one byte stream in, a trace file plus
//! filtered subscriptions out.

use std::time::Duration;

use tracelink_core::{Broker, BrokerConfig, BrokerState, FilterPredicate};
use tracelink_harness::{log_frame, log_message, ScriptedTransport};
use tracelink_proto::ShortId;

fn id(s: &str) -> Option<ShortId> {
    s.parse().ok()
}

/// Three frames, two subscriptions: match-all sees every message in order,
/// the `(SYS, JOUR)` filter sees only its two, and the trace file holds all
/// three frames byte-identical to the input.
#[tokio::test]
async fn fan_out_with_filters_and_persistence() {
    let frames = [
        log_frame("SYS", "JOUR", 0, "journal entry"),
        log_frame("APP", "CTX", 1, "app event"),
        log_frame("SYS", "JOUR", 2, "another entry"),
    ];
    let input: Vec<u8> = frames.iter().flat_map(|f| f.to_vec()).collect();

    let dir = tempfile::tempdir().unwrap();
    let trace_path = dir.path().join("vehicle.dlt");

    let mut broker = Broker::new(
        ScriptedTransport::chunked(&input, 7),
        BrokerConfig { trace_file: Some(trace_path.clone()), ..BrokerConfig::default() },
    );
    let mut all = broker.subscribe(FilterPredicate::match_all()).unwrap();
    let mut journal = broker.subscribe(FilterPredicate::pair(id("SYS"), id("JOUR"))).unwrap();

    broker.start().unwrap();

    let everything = all.wait_for(3, Duration::from_secs(5)).await;
    assert_eq!(everything.len(), 3);
    assert_eq!(everything[0], log_message("SYS", "JOUR", 0, "journal entry"));
    assert_eq!(everything[1], log_message("APP", "CTX", 1, "app event"));
    assert_eq!(everything[2], log_message("SYS", "JOUR", 2, "another entry"));

    let journal_only = journal.wait_for(2, Duration::from_secs(5)).await;
    assert_eq!(journal_only.len(), 2);
    assert_eq!(journal_only[0].counter(), 0);
    assert_eq!(journal_only[1].counter(), 2);
    // Nothing else matched the filter.
    assert!(journal.try_recv().is_none());

    broker.stop().await.unwrap();
    assert_eq!(broker.state(), BrokerState::Stopped);

    let persisted = tokio::fs::read(&trace_path).await.unwrap();
    assert_eq!(persisted, input, "trace file must be byte-identical to the wire stream");

    let stats = broker.stats();
    assert_eq!(stats.frames_decoded, 3);
    assert_eq!(stats.frames_persisted, 3);
    assert_eq!(stats.decode_errors(), 0);
    assert!(!stats.storage_degraded);
}

/// A subscriber that never drains its queue loses messages (drop-new, with
/// a counter) but neither the trace file nor other subscribers do.
#[tokio::test]
async fn slow_subscriber_loses_only_its_own_messages() {
    let frames: Vec<_> = (0..5).map(|n| log_frame("SYS", "JOUR", n, "burst")).collect();
    let input: Vec<u8> = frames.iter().flat_map(|f| f.to_vec()).collect();

    let dir = tempfile::tempdir().unwrap();
    let trace_path = dir.path().join("vehicle.dlt");

    let mut broker = Broker::new(
        ScriptedTransport::chunked(&input, 64),
        BrokerConfig { trace_file: Some(trace_path.clone()), ..BrokerConfig::default() },
    );
    let mut healthy = broker.subscribe(FilterPredicate::match_all()).unwrap();
    let mut slow = broker.subscribe_with_capacity(FilterPredicate::match_all(), 2).unwrap();

    broker.start().unwrap();

    // The healthy subscriber observes everything, proving dispatch ran.
    assert_eq!(healthy.wait_for(5, Duration::from_secs(5)).await.len(), 5);

    // Stopping with a still-full slow queue must not lose persisted frames.
    broker.stop().await.unwrap();
    let persisted = tokio::fs::read(&trace_path).await.unwrap();
    assert_eq!(persisted, input);

    let survived = slow.wait_for(5, Duration::from_millis(100)).await;
    assert_eq!(survived.len(), 2, "drop-new keeps the oldest messages");
    assert_eq!(survived[0].counter(), 0);
    assert_eq!(survived[1].counter(), 1);
    assert_eq!(slow.dropped(), 3);
    assert_eq!(healthy.dropped(), 0);
}

/// Subscriptions registered before `start` are queued for activation and
/// receive the stream from its first message.
#[tokio::test]
async fn subscriptions_created_before_start_are_activated() {
    let input = log_frame("SYS", "JOUR", 9, "early bird");

    let mut broker = Broker::new(
        ScriptedTransport::frames([input]),
        BrokerConfig::default(),
    );
    let mut sub = broker.subscribe(FilterPredicate::match_all()).unwrap();
    broker.start().unwrap();

    let messages = sub.wait_for(1, Duration::from_secs(5)).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].counter(), 9);
    broker.stop().await.unwrap();
}

/// A broker can run without persistence; live delivery is unaffected.
#[tokio::test]
async fn persistence_is_optional() {
    let mut broker = Broker::new(
        ScriptedTransport::frames([log_frame("SYS", "JOUR", 1, "live only")]),
        BrokerConfig { trace_file: None, ..BrokerConfig::default() },
    );
    let mut sub = broker.subscribe(FilterPredicate::match_all()).unwrap();
    broker.start().unwrap();

    assert_eq!(sub.wait_for(1, Duration::from_secs(5)).await.len(), 1);
    broker.stop().await.unwrap();
    assert_eq!(broker.stats().frames_persisted, 0);
}

/// An unwritable trace path degrades storage but never live delivery.
#[tokio::test]
async fn storage_failure_degrades_but_does_not_stop_ingestion() {
    let dir = tempfile::tempdir().unwrap();

    let mut broker = Broker::new(
        ScriptedTransport::frames([
            log_frame("SYS", "JOUR", 0, "one"),
            log_frame("SYS", "JOUR", 1, "two"),
        ]),
        BrokerConfig {
            // A directory cannot be opened as the trace file.
            trace_file: Some(dir.path().to_path_buf()),
            ..BrokerConfig::default()
        },
    );
    let mut sub = broker.subscribe(FilterPredicate::match_all()).unwrap();
    broker.start().unwrap();

    let messages = sub.wait_for(2, Duration::from_secs(5)).await;
    assert_eq!(messages.len(), 2, "live delivery survives storage failure");

    broker.stop().await.unwrap();
    let stats = broker.stats();
    assert!(stats.storage_degraded);
    assert_eq!(stats.frames_persisted, 0);
    assert!(stats.storage_failures >= 1);
}

/// The latest-timestamp view follows the newest decoded message.
#[tokio::test]
async fn latest_timestamp_tracks_the_stream() {
    let mut broker = Broker::new(
        ScriptedTransport::frames([log_frame("SYS", "JOUR", 4, "tick")]),
        BrokerConfig::default(),
    );
    assert!(broker.latest_timestamp().is_none());

    let mut sub = broker.subscribe(FilterPredicate::match_all()).unwrap();
    broker.start().unwrap();
    let messages = sub.wait_for(1, Duration::from_secs(5)).await;
    assert_eq!(messages.len(), 1);

    let expected = std::time::UNIX_EPOCH
        + Duration::from_secs(u64::from(messages[0].timestamp_seconds()));
    assert_eq!(broker.latest_timestamp(), Some(expected));
    broker.stop().await.unwrap();
}
