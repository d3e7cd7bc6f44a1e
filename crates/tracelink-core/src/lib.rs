//! Ingestion pipeline for DLT diagnostic trace streams.
//!
//! One [`Broker`] turns one inbound byte stream from an in-vehicle logging
//! daemon into a durable trace file plus any number of independently
//! filtered live message feeds. The hard requirements this crate is built
//! around:
//!
//! - frame boundaries are not delimited by the transport, so the
//!   [`scanner`] recovers them from the frames themselves, re-locking after
//!   corruption;
//! - a slow or dead consumer must never stall decoding, disk writes or
//!   other consumers, so every subscription gets its own bounded queue with
//!   an explicit drop-new policy and dropped-message counter;
//! - the trace file holds the received bytes verbatim, whole frames only,
//!   regardless of what live consumers do.
//!
//! # Architecture
//!
//! The pipeline (transport read → frame scan → decode → persist → dispatch)
//! runs as one spawned task owning the transport, the scanner and the file
//! handle exclusively. The broker API shares only the subscription registry
//! (behind a mutex, never held across `await`) and atomic diagnostic
//! counters with that task. Shutdown is cooperative and observed between
//! frames.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use tracelink_core::{Broker, BrokerConfig, FilterPredicate, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = TcpTransport::new("192.168.7.2:3490");
//!     let mut broker = Broker::new(
//!         transport,
//!         BrokerConfig { trace_file: Some("vehicle.dlt".into()), ..BrokerConfig::default() },
//!     );
//!     broker.start()?;
//!
//!     let mut journal =
//!         broker.subscribe(FilterPredicate::pair(Some("SYS".parse()?), Some("JOUR".parse()?)))?;
//!     for message in journal.wait_for(10, Duration::from_secs(5)).await {
//!         println!("{message}");
//!     }
//!
//!     broker.stop().await?;
//!     Ok(())
//! }
//! ```
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod error;
pub mod filter;
pub mod scanner;
pub mod stats;
pub mod store;
pub mod subscription;
pub mod transport;

pub use broker::{Broker, BrokerConfig, BrokerState, ReconnectPolicy};
pub use error::{BrokerError, FilterError, StorageError, TransportError};
pub use filter::{FilterPair, FilterPredicate, FilterRegistry, SubscriptionId};
pub use scanner::{FrameScanner, IncompleteTail, ScanEvent};
pub use stats::PipelineStats;
pub use store::TraceWriter;
pub use subscription::Subscription;
pub use transport::{FileTailTransport, TcpTransport, Transport};
