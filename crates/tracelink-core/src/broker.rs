//! Broker lifecycle and the ingestion task.
//!
//! One broker owns one transport, one optional trace file and one set of
//! subscriptions. The ingestion pipeline (transport read → frame scan →
//! decode → persist → dispatch) runs as a single spawned task so consumer
//! code can never stall it; the only shared mutable state is the
//! subscription registry behind a mutex and the diagnostic counters.
//!
//! # State machine
//!
//! ```text
//! ┌─────────┐ start() ┌─────────┐ stop()/EOS ┌──────────┐        ┌─────────┐
//! │ Created │────────>│ Running │───────────>│ Stopping │───────>│ Stopped │
//! └─────────┘         └─────────┘            └──────────┘ drained└─────────┘
//! ```
//!
//! `stop` is cooperative: the cancellation signal is observed between
//! transport reads, never mid-frame, and the trace writer is flushed and
//! closed before `stop` returns.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracelink_proto::{decode, DecodingProfile};

use crate::error::{BrokerError, TransportError};
use crate::filter::{FilterPredicate, FilterRegistry, SubscriptionId};
use crate::scanner::{FrameScanner, ScanEvent};
use crate::stats::{PipelineCounters, PipelineStats};
use crate::store::TraceWriter;
use crate::subscription::Subscription;
use crate::transport::Transport;

/// Broker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// Constructed; subscriptions queue up for activation.
    Created,
    /// Ingestion task running.
    Running,
    /// Shutdown signalled, pipeline draining.
    Stopping,
    /// Pipeline finished, writer closed, queues closed.
    Stopped,
}

/// What to do when the transport ends or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Treat transport loss as fatal and stop ingesting.
    #[default]
    Never,
    /// Reconnect after `delay`, restarting frame synchronization.
    Retry {
        /// Pause between reconnection attempts.
        delay: Duration,
    },
}

/// Broker construction options.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Trace file every received frame is appended to; `None` disables
    /// persistence (live subscriptions only).
    pub trace_file: Option<PathBuf>,
    /// Decoding constants, fixed for the life of the broker.
    pub profile: DecodingProfile,
    /// Queue capacity for `subscribe` (see `subscribe_with_capacity`).
    pub queue_capacity: usize,
    /// Behavior on transport end-of-stream or failure.
    pub reconnect: ReconnectPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            trace_file: None,
            profile: DecodingProfile::default(),
            queue_capacity: 512,
            reconnect: ReconnectPolicy::Never,
        }
    }
}

/// Receives one daemon stream, persists it, and fans decoded messages out
/// to filtered subscriptions.
pub struct Broker {
    config: BrokerConfig,
    state: Arc<Mutex<BrokerState>>,
    registry: Arc<Mutex<FilterRegistry>>,
    counters: Arc<PipelineCounters>,
    cancel: CancellationToken,
    transport: Option<Box<dyn Transport>>,
    ingest: Option<JoinHandle<()>>,
}

impl Broker {
    /// Create a broker over `transport`.
    pub fn new(transport: impl Transport + 'static, config: BrokerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(BrokerState::Created)),
            registry: Arc::new(Mutex::new(FilterRegistry::new())),
            counters: Arc::new(PipelineCounters::default()),
            cancel: CancellationToken::new(),
            transport: Some(Box::new(transport)),
            ingest: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BrokerState {
        *lock(&self.state)
    }

    /// Snapshot of the pipeline diagnostic counters.
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Storage timestamp of the most recently decoded message.
    pub fn latest_timestamp(&self) -> Option<SystemTime> {
        self.counters.latest_timestamp()
    }

    /// Spawn the ingestion pipeline.
    ///
    /// Valid exactly once, from [`BrokerState::Created`]; must be called
    /// within a Tokio runtime.
    pub fn start(&mut self) -> Result<(), BrokerError> {
        {
            let mut state = lock(&self.state);
            if *state != BrokerState::Created {
                return Err(BrokerError::AlreadyStarted);
            }
            *state = BrokerState::Running;
        }
        let transport = self.transport.take().ok_or(BrokerError::AlreadyStarted)?;
        let pipeline = Pipeline {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            registry: Arc::clone(&self.registry),
            counters: Arc::clone(&self.counters),
            cancel: self.cancel.clone(),
        };
        self.ingest = Some(tokio::spawn(pipeline.run(transport)));
        Ok(())
    }

    /// Stop ingestion, flush and close the trace file, close all
    /// subscription queues.
    ///
    /// Idempotent; later calls are no-ops. On return the trace file
    /// contains every frame received before the stop signal was observed.
    pub async fn stop(&mut self) -> Result<(), BrokerError> {
        {
            let mut state = lock(&self.state);
            match *state {
                BrokerState::Created => {
                    *state = BrokerState::Stopped;
                    lock(&self.registry).close_all();
                    return Ok(());
                }
                BrokerState::Running => *state = BrokerState::Stopping,
                BrokerState::Stopping | BrokerState::Stopped => {}
            }
        }
        self.cancel.cancel();
        if let Some(handle) = self.ingest.take() {
            // The task never panics; a join error only occurs on runtime
            // shutdown, where there is nothing left to clean up.
            let _ = handle.await;
        }
        *lock(&self.state) = BrokerState::Stopped;
        Ok(())
    }

    /// Register a subscription with the default queue capacity.
    ///
    /// Valid while `Created` (activated by `start`) or `Running`.
    pub fn subscribe(&self, predicate: FilterPredicate) -> Result<Subscription, BrokerError> {
        self.subscribe_with_capacity(predicate, self.config.queue_capacity)
    }

    /// Register a subscription with an explicit bounded queue capacity.
    ///
    /// When the queue is full, new matching messages are dropped for this
    /// subscription only and counted on [`Subscription::dropped`]; other
    /// subscriptions and the trace file are unaffected.
    pub fn subscribe_with_capacity(
        &self,
        predicate: FilterPredicate,
        capacity: usize,
    ) -> Result<Subscription, BrokerError> {
        {
            let state = lock(&self.state);
            if !matches!(*state, BrokerState::Created | BrokerState::Running) {
                return Err(BrokerError::InvalidState { state: *state, operation: "subscribe" });
            }
        }
        let (id, receiver, dropped) = lock(&self.registry).register(predicate, capacity)?;
        tracing::debug!(%id, "subscription registered");
        Ok(Subscription::new(id, receiver, dropped))
    }

    /// Remove a subscription, closing its queue. Always safe; returns
    /// whether the id was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = lock(&self.registry).unregister(id);
        if removed {
            tracing::debug!(%id, "subscription removed");
        }
        removed
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        // Best effort: wake the ingestion task so it does not outlive the
        // broker silently. `stop` remains the orderly path.
        self.cancel.cancel();
    }
}

/// Everything the ingestion task owns or shares.
struct Pipeline {
    config: BrokerConfig,
    state: Arc<Mutex<BrokerState>>,
    registry: Arc<Mutex<FilterRegistry>>,
    counters: Arc<PipelineCounters>,
    cancel: CancellationToken,
}

impl Pipeline {
    async fn run(self, mut transport: Box<dyn Transport>) {
        let mut scanner = FrameScanner::new(self.config.profile);
        let mut writer = self.open_writer().await;

        if self.establish(&mut transport, true).await {
            self.read_loop(&mut transport, &mut scanner, &mut writer).await;
        }

        if let Some(tail) = scanner.finish() {
            tracing::debug!(buffered = tail.buffered, skipped = tail.skipped, "incomplete frame at end of stream");
        }
        if let Some(writer) = writer.take() {
            let frames = writer.frames_written();
            if let Err(error) = writer.close().await {
                tracing::error!(%error, "failed to close trace file");
                self.counters.record_storage_failure();
            } else {
                tracing::info!(frames, "trace file closed");
            }
        }
        transport.close().await;
        lock(&self.registry).close_all();
        *lock(&self.state) = BrokerState::Stopped;
        tracing::info!("ingestion finished");
    }

    async fn read_loop(
        &self,
        transport: &mut Box<dyn Transport>,
        scanner: &mut FrameScanner,
        writer: &mut Option<TraceWriter>,
    ) {
        loop {
            let chunk = tokio::select! {
                () = self.cancel.cancelled() => break,
                chunk = transport.recv() => chunk,
            };
            match chunk {
                Ok(Some(bytes)) => {
                    scanner.extend(&bytes);
                    while let Some(event) = scanner.next_event() {
                        match event {
                            ScanEvent::Frame(frame) => self.handle_frame(frame, writer).await,
                            ScanEvent::Resync { skipped } => {
                                self.counters.record_resync(skipped);
                                tracing::warn!(skipped, "recovered frame sync after corrupted input");
                            }
                        }
                    }
                }
                Ok(None) => {
                    tracing::info!("transport reached end of stream");
                    if !self.restart(transport, scanner).await {
                        break;
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "transport failure");
                    if !self.restart(transport, scanner).await {
                        break;
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, frame: Bytes, writer: &mut Option<TraceWriter>) {
        let message = match decode(&frame, &self.config.profile) {
            Ok(message) => message,
            Err(error) => {
                self.counters.record_decode_error(&error);
                tracing::debug!(%error, len = frame.len(), "skipping undecodable frame");
                return;
            }
        };
        self.counters.record_message(&message);

        // Persistence first, delivery second; neither can fail the other.
        if let Some(active) = writer.as_mut() {
            match active.append(message.raw_bytes()).await {
                Ok(()) => self.counters.record_persisted(),
                Err(error) => {
                    tracing::error!(%error, "trace persistence degraded; live delivery continues");
                    self.counters.record_storage_failure();
                    *writer = None;
                }
            }
        }

        let report = lock(&self.registry).dispatch(&message);
        if report.dropped > 0 {
            tracing::trace!(dropped = report.dropped, "slow subscriptions dropped a message");
        }
    }

    async fn open_writer(&self) -> Option<TraceWriter> {
        let path = self.config.trace_file.as_ref()?;
        match TraceWriter::create(path).await {
            Ok(writer) => Some(writer),
            Err(error) => {
                tracing::error!(%error, "trace file unavailable; running without persistence");
                self.counters.record_storage_failure();
                None
            }
        }
    }

    /// Connect the transport, honoring the reconnect policy.
    ///
    /// Returns `false` when ingestion should end instead.
    async fn establish(&self, transport: &mut Box<dyn Transport>, first: bool) -> bool {
        let delay = match (self.config.reconnect, first) {
            (ReconnectPolicy::Never, false) => return false,
            (ReconnectPolicy::Never, true) => None,
            (ReconnectPolicy::Retry { delay }, _) => Some(delay),
        };
        loop {
            let attempt = tokio::select! {
                () = self.cancel.cancelled() => return false,
                attempt = transport.connect() => attempt,
            };
            match attempt {
                Ok(()) => return true,
                Err(error) => {
                    self.log_connect_failure(&error);
                    let Some(delay) = delay else { return false };
                    tokio::select! {
                        () = self.cancel.cancelled() => return false,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Handle stream end or failure mid-run: either reconnect (counted,
    /// scanner resynchronized) or report that ingestion is over.
    async fn restart(&self, transport: &mut Box<dyn Transport>, scanner: &mut FrameScanner) -> bool {
        if matches!(self.config.reconnect, ReconnectPolicy::Never) {
            return false;
        }
        transport.close().await;
        scanner.reset();
        if self.establish(transport, false).await {
            self.counters.record_reconnect();
            tracing::info!("transport reconnected, ingestion restarted");
            true
        } else {
            false
        }
    }

    fn log_connect_failure(&self, error: &TransportError) {
        tracing::warn!(%error, "transport connect failed");
    }
}

/// Lock a mutex, recovering the guard if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
