//! Transport traits for modem communication.
//!
//! Three seams separate the protocol engine from real devices:
//!
//! - [`Transport`]: a request/receive byte link with per-receive timeouts.
//!   Used for the raw pre-multiplex device during the handshake and for the
//!   modem management socket.
//! - [`DeviceProvider`]: opens raw devices and multiplexed logical channels
//!   by path. A logical channel is returned as split read/write halves so a
//!   reader loop and command issuers can use it concurrently.
//! - [`ManagementConnector`]: (re)connects to the modem management endpoint.
//!
//! Production implementations live in `modemlink-transport`; mocks for unit
//! tests live in `modemlink-test-harness`.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Asynchronous byte-level transport.
///
/// Implementations handle buffering and error mapping at the physical
/// layer. Line framing and AT semantics are handled by the consumers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes, waiting until they are all written and flushed.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes into the provided buffer.
    ///
    /// Returns the number of bytes read; `Ok(0)` means the peer closed the
    /// link. Waits up to `timeout` for data and returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if none arrives.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Boxed read half of a logical channel.
pub type ChannelReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a logical channel.
pub type ChannelWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An opened logical channel device, split into its two halves.
pub struct ChannelIo {
    /// Bytes from the modem.
    pub reader: ChannelReader,
    /// Bytes to the modem.
    pub writer: ChannelWriter,
}

impl std::fmt::Debug for ChannelIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelIo").finish_non_exhaustive()
    }
}

/// Opens modem devices by path.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Open the raw (pre-multiplex) device used for the handshake.
    async fn open_raw(&self, path: &str) -> Result<Box<dyn Transport>>;

    /// Open one multiplexed logical channel, e.g. `/dev/ts0710mux3`.
    async fn open_channel(&self, path: &str) -> Result<ChannelIo>;
}

/// Connects to the modem management endpoint.
#[async_trait]
pub trait ManagementConnector: Send + Sync {
    /// Attempt one connection. Retry policy belongs to the caller.
    async fn connect(&self) -> Result<Box<dyn Transport>>;
}
