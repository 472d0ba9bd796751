//! Local (Unix domain) socket transport for the modem management endpoint.
//!
//! The modem management daemon publishes lifecycle notices (`Modem Alive`,
//! `Modem Reset`, ...) on a well-known local socket and accepts a blocked
//! notice in the other direction. [`LocalSocketTransport`] wraps one
//! connection; [`LocalSocketConnector`] creates them on demand for the
//! lifecycle monitor's reconnect loop.
//!
//! # Example
//!
//! ```no_run
//! use modemlink_transport::LocalSocketTransport;
//! use modemlink_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> modemlink_core::Result<()> {
//! let mut transport = LocalSocketTransport::connect("/dev/socket/modemd").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use modemlink_core::error::{Error, Result};
use modemlink_core::transport::{ManagementConnector, Transport};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// One connection to a local stream socket.
#[derive(Debug)]
pub struct LocalSocketTransport {
    stream: Option<UnixStream>,
    path: PathBuf,
}

impl LocalSocketTransport {
    /// Connect using the default timeout.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_timeout(path, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect, giving up after `timeout`.
    pub async fn connect_with_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), timeout_ms = timeout.as_millis(), "Connecting to local socket");

        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| {
                tracing::warn!(path = %path.display(), "Local socket connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::debug!(path = %path.display(), error = %e, "Local socket connection failed");
                map_connect_error(e, path)
            })?;

        tracing::info!(path = %path.display(), "Local socket connected");

        Ok(Self::from_stream(stream, path.to_path_buf()))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: UnixStream, path: PathBuf) -> Self {
        Self {
            stream: Some(stream),
            path,
        }
    }

    /// Socket path this transport was connected to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Transport for LocalSocketTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            path = %self.path.display(),
            data = ?String::from_utf8_lossy(data),
            "Sending data"
        );

        stream.write_all(data).await.map_err(map_io_error)?;
        stream.flush().await.map_err(map_io_error)?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(0)) => {
                tracing::debug!(path = %self.path.display(), "Peer closed local socket");
                Ok(0)
            }
            Ok(Ok(n)) => {
                tracing::trace!(
                    path = %self.path.display(),
                    data = ?String::from_utf8_lossy(&buf[..n]),
                    "Received data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to shutdown local socket (continuing anyway)"
                );
            }
            tracing::debug!(path = %self.path.display(), "Local socket closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Connects to the management socket at a fixed path.
#[derive(Debug, Clone)]
pub struct LocalSocketConnector {
    path: PathBuf,
    connect_timeout: Duration,
}

impl LocalSocketConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the per-attempt connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ManagementConnector for LocalSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let transport =
            LocalSocketTransport::connect_with_timeout(&self.path, self.connect_timeout).await?;
        Ok(Box::new(transport))
    }
}

fn map_connect_error(e: std::io::Error, path: &Path) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound => {
            Error::Transport(format!("management socket unavailable: {}", path.display()))
        }
        _ => Error::Io(e),
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
