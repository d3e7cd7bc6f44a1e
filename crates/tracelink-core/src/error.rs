//! Error taxonomy of the ingestion pipeline.
//!
//! Only transport loss can stop ingestion. Decode failures and
//! resynchronization are handled locally and counted; storage failures
//! degrade persistence but never live delivery; a full subscription queue is
//! accounted per subscription and surfaces nowhere else.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::broker::BrokerState;

/// Transport-level failure. Fatal to ingestion unless the broker's
/// reconnect policy intercepts it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Establishing the connection failed.
    #[error("failed to connect to {target}")]
    Connect {
        /// Address, path or description of the endpoint.
        target: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Reading from an established connection failed.
    #[error("transport read failed")]
    Io(#[from] io::Error),

    /// An operation was attempted before `connect` succeeded.
    #[error("transport is not connected")]
    NotConnected,
}

/// Trace-file failure. Reported once, then persistence is disabled while
/// ingestion and live delivery continue.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The trace file could not be opened.
    #[error("failed to open trace file {path}")]
    Open {
        /// Path of the trace file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Appending a frame failed (disk full, permissions revoked).
    #[error("failed to append to trace file {path}")]
    Write {
        /// Path of the trace file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Flushing or syncing the file on close failed.
    #[error("failed to flush trace file {path}")]
    Flush {
        /// Path of the trace file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Errors returned by the broker's public surface.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// `start` was called more than once.
    #[error("broker already started")]
    AlreadyStarted,

    /// The operation is not valid in the broker's current state.
    #[error("operation `{operation}` is invalid in state {state:?}")]
    InvalidState {
        /// State the broker was in.
        state: BrokerState,
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// The filter predicate was rejected by the registry.
    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Errors raised while registering a filter predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The predicate holds more pairs than the registry accepts.
    #[error("predicate has {count} filter pairs, limit is {limit}")]
    TooManyPairs {
        /// Pairs supplied.
        count: usize,
        /// Maximum accepted.
        limit: usize,
    },
}
