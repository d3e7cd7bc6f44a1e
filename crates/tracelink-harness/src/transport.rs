//! Transports with fully scripted behavior.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracelink_core::{Transport, TransportError};

/// Replays a fixed sequence of byte chunks, then reports end of stream.
///
/// Chunk boundaries are preserved exactly as scripted, which is what makes
/// reassembly tests deterministic: a frame split mid-header on the wire is
/// a frame split mid-header in the test.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    chunks: VecDeque<Bytes>,
    connected: bool,
}

impl ScriptedTransport {
    /// Replay the given chunks verbatim.
    pub fn new(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        Self { chunks: chunks.into_iter().collect(), connected: false }
    }

    /// Replay `data` split into `chunk_size`-byte reads.
    pub fn chunked(data: impl AsRef<[u8]>, chunk_size: usize) -> Self {
        let data = Bytes::copy_from_slice(data.as_ref());
        let size = chunk_size.max(1);
        let mut chunks = VecDeque::new();
        let mut rest = data;
        while !rest.is_empty() {
            let take = rest.len().min(size);
            chunks.push_back(rest.split_to(take));
        }
        Self { chunks, connected: false }
    }

    /// Replay a sequence of frames as one contiguous stream.
    pub fn frames(frames: impl IntoIterator<Item = Bytes>) -> Self {
        Self::new(frames)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(self.chunks.pop_front())
    }

    async fn close(&mut self) {
        self.connected = false;
    }
}

/// A transport fed at runtime through an [`mpsc`] channel.
///
/// End of stream is signalled by dropping every sender. Useful for timing
/// tests: the broker is already running when the test decides what arrives
/// next.
#[derive(Debug)]
pub struct ChannelTransport {
    receiver: mpsc::Receiver<Bytes>,
}

impl ChannelTransport {
    /// Create a transport and the sender that feeds it.
    pub fn new(buffer: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self { receiver })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.receiver.recv().await)
    }

    async fn close(&mut self) {
        self.receiver.close();
    }
}
