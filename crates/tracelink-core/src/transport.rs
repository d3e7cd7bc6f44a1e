//! Transport abstraction for the inbound byte stream.
//!
//! The pipeline only needs sequential byte delivery and an end-of-stream
//! signal; connection policy lives in the implementations. Production uses
//! [`TcpTransport`] against the daemon's listening port or
//! [`FileTailTransport`] against a trace file another process is writing;
//! tests use the scripted transports from the harness crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::error::TransportError;

/// Read buffer size for a single transport read.
const READ_CHUNK: usize = 8 * 1024;

/// A sequential byte stream from the logging daemon.
///
/// `recv` returns `Ok(None)` exactly once, at end of stream. After a
/// successful re-`connect` the stream starts over from the transport's
/// notion of "current"; the broker treats that as an ingestion restart.
#[async_trait]
pub trait Transport: Send {
    /// Establish (or re-establish) the stream.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Receive the next chunk of bytes; `None` signals end of stream.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Release the stream. Safe to call when not connected.
    async fn close(&mut self);
}

/// TCP connection to the daemon.
#[derive(Debug)]
pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Default time allowed for a connection attempt.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a transport for `addr` (host:port).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            stream: None,
        }
    }

    /// Override the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let connect = TcpStream::connect(&self.addr);
        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| TransportError::Connect {
                target: self.addr.clone(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            })?
            .map_err(|source| TransportError::Connect { target: self.addr.clone(), source })?;
        tracing::info!(addr = %self.addr, "connected to daemon");
        self.stream = Some(stream);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf.freeze()))
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            use tokio::io::AsyncWriteExt;
            let _ = stream.shutdown().await;
        }
    }
}

/// Reads a trace file as a byte stream, optionally following appends.
///
/// With `follow` enabled the transport never reports end of stream: at the
/// end of the file it polls for data appended by the writing process. This
/// serves the deployment where the daemon log is written by another process
/// and ingested from disk instead of a socket.
#[derive(Debug)]
pub struct FileTailTransport {
    path: PathBuf,
    follow: bool,
    poll_interval: Duration,
    file: Option<File>,
}

impl FileTailTransport {
    /// Default polling interval in follow mode.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Create a transport reading `path` once, stopping at end of file.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            follow: false,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            file: None,
        }
    }

    /// Keep polling for appended data instead of reporting end of stream.
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Override the follow-mode polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl Transport for FileTailTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let file = File::open(&self.path).await.map_err(|source| TransportError::Connect {
            target: self.path.display().to_string(),
            source,
        })?;
        tracing::info!(path = %self.path.display(), follow = self.follow, "tailing trace file");
        self.file = Some(file);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        let file = self.file.as_mut().ok_or(TransportError::NotConnected)?;
        loop {
            let mut buf = BytesMut::with_capacity(READ_CHUNK);
            let n = file.read_buf(&mut buf).await?;
            if n > 0 {
                return Ok(Some(buf.freeze()));
            }
            if !self.follow {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn close(&mut self) {
        self.file = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn tcp_transport_streams_until_peer_closes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hello").await.unwrap();
            socket.write_all(b" world").await.unwrap();
        });

        let mut transport = TcpTransport::new(addr.to_string());
        transport.connect().await.unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = transport.recv().await.unwrap() {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, b"hello world");

        transport.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_recv_before_connect_is_an_error() {
        let mut transport = TcpTransport::new("127.0.0.1:9");
        assert!(matches!(transport.recv().await, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn file_transport_reads_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.dlt");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let mut transport = FileTailTransport::new(&path);
        transport.connect().await.unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = transport.recv().await.unwrap() {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, b"0123456789");
    }

    #[tokio::test]
    async fn file_transport_follow_mode_sees_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.dlt");
        tokio::fs::write(&path, b"start-").await.unwrap();

        let mut transport = FileTailTransport::new(&path)
            .follow(true)
            .poll_interval(Duration::from_millis(10));
        transport.connect().await.unwrap();

        let first = transport.recv().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), b"start-");

        let append_path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let mut file = tokio::fs::OpenOptions::new()
                .append(true)
                .open(&append_path)
                .await
                .unwrap();
            file.write_all(b"more").await.unwrap();
        });

        let second = transport.recv().await.unwrap().unwrap();
        assert_eq!(second.as_ref(), b"more");

        let missing = FileTailTransport::new(dir.path().join("absent.dlt"))
            .connect()
            .await;
        assert!(matches!(missing, Err(TransportError::Connect { .. })));
    }
}
