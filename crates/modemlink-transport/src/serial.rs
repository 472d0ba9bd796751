//! Serial device transports.
//!
//! The modem exposes two kinds of serial devices:
//!
//! - the raw device (e.g. `/dev/ttyS1`), used only for the handshake that
//!   switches the modem into multiplexed mode. [`SerialTransport`] wraps it
//!   as a [`Transport`].
//! - the logical channel devices created by the kernel multiplexer driver
//!   (e.g. `/dev/ts0710mux0`). [`SerialDevices`] opens these and hands them
//!   out as split read/write halves through [`DeviceProvider`].
//!
//! # Example
//!
//! ```no_run
//! use modemlink_transport::SerialTransport;
//! use modemlink_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> modemlink_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyS1", 115200).await?;
//! transport.send(b"AT\r").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use modemlink_core::error::{Error, Result};
use modemlink_core::transport::{ChannelIo, DeviceProvider, Transport};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Serial port configuration.
///
/// Defaults suit the modem UARTs and mux devices seen in practice: 115200
/// baud, 8N1, no flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate.
    pub baud_rate: u32,
    /// Number of data bits.
    pub data_bits: DataBits,
    /// Number of stop bits.
    pub stop_bits: StopBits,
    /// Parity checking.
    pub parity: Parity,
    /// Flow control. Hardware flow control is common on the raw UART.
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

fn open_stream(path: &str, config: &SerialConfig) -> Result<SerialStream> {
    tracing::debug!(
        path = %path,
        baud_rate = config.baud_rate,
        data_bits = ?config.data_bits,
        stop_bits = ?config.stop_bits,
        parity = ?config.parity,
        flow_control = ?config.flow_control,
        "Opening serial device"
    );

    tokio_serial::new(path, config.baud_rate)
        .data_bits(config.data_bits.into())
        .stop_bits(config.stop_bits.into())
        .parity(config.parity.into())
        .flow_control(config.flow_control.into())
        .open_native_async()
        .map_err(|e| {
            tracing::error!(path = %path, error = %e, "Failed to open serial device");
            Error::Transport(format!("Failed to open serial device {}: {}", path, e))
        })
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => {
            Error::ConnectionLost
        }
        _ => Error::Io(e),
    }
}

// ---------------------------------------------------------------------------
// Raw device
// ---------------------------------------------------------------------------

/// The raw modem UART as a [`Transport`].
pub struct SerialTransport {
    port: Option<SerialStream>,
    path: String,
}

impl SerialTransport {
    /// Open a serial device with the given baud rate and default settings.
    pub async fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(path, config).await
    }

    /// Open a serial device with full configuration control.
    pub async fn open_with_config(path: &str, config: SerialConfig) -> Result<Self> {
        let stream = open_stream(path, &config)?;
        tracing::info!(path = %path, baud_rate = config.baud_rate, "Raw modem device opened");
        Ok(Self {
            port: Some(stream),
            path: path.to_string(),
        })
    }

    /// Device path this transport was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            path = %self.path,
            bytes = data.len(),
            data = ?String::from_utf8_lossy(data),
            "Sending data"
        );

        port.write_all(data).await.map_err(|e| {
            tracing::error!(path = %self.path, error = %e, "Failed to send data");
            map_io_error(e)
        })?;
        port.flush().await.map_err(|e| {
            tracing::error!(path = %self.path, error = %e, "Failed to flush serial device");
            map_io_error(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(
                    path = %self.path,
                    bytes = n,
                    data = ?String::from_utf8_lossy(&buf[..n]),
                    "Received data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(path = %self.path, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => {
                tracing::trace!(
                    path = %self.path,
                    timeout_ms = timeout.as_millis(),
                    "Timeout waiting for data"
                );
                Err(Error::Timeout)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(
                    path = %self.path,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }
            tracing::debug!(path = %self.path, "Raw modem device closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

// ---------------------------------------------------------------------------
// Device provider
// ---------------------------------------------------------------------------

/// Opens the raw device and the multiplexed channel devices as serial ports.
#[derive(Debug, Clone, Default)]
pub struct SerialDevices {
    raw: SerialConfig,
    channel: SerialConfig,
}

impl SerialDevices {
    /// Use `raw` for the handshake device and `channel` for mux channels.
    pub fn new(raw: SerialConfig, channel: SerialConfig) -> Self {
        Self { raw, channel }
    }
}

#[async_trait]
impl DeviceProvider for SerialDevices {
    async fn open_raw(&self, path: &str) -> Result<Box<dyn Transport>> {
        let transport = SerialTransport::open_with_config(path, self.raw.clone()).await?;
        Ok(Box::new(transport))
    }

    async fn open_channel(&self, path: &str) -> Result<ChannelIo> {
        let stream = open_stream(path, &self.channel)?;
        tracing::debug!(path = %path, "Channel device opened");
        let (reader, writer) = tokio::io::split(stream);
        Ok(ChannelIo {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.flow_control, FlowControl::None);
    }

    #[test]
    fn enum_conversions() {
        assert_eq!(
            tokio_serial::DataBits::from(DataBits::Seven),
            tokio_serial::DataBits::Seven
        );
        assert_eq!(
            tokio_serial::StopBits::from(StopBits::Two),
            tokio_serial::StopBits::Two
        );
        assert_eq!(
            tokio_serial::Parity::from(Parity::Even),
            tokio_serial::Parity::Even
        );
        assert_eq!(
            tokio_serial::FlowControl::from(FlowControl::Hardware),
            tokio_serial::FlowControl::Hardware
        );
    }

    #[test]
    fn broken_pipe_maps_to_connection_lost() {
        let e = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        assert!(matches!(map_io_error(e), Error::ConnectionLost));
        let e = std::io::Error::from(std::io::ErrorKind::InvalidData);
        assert!(matches!(map_io_error(e), Error::Io(_)));
    }

    #[tokio::test]
    async fn opening_missing_device_is_a_transport_error() {
        let result = SerialTransport::open("/dev/modemlink-does-not-exist", 115200).await;
        assert!(matches!(result, Err(Error::Transport(_))));

        let devices = SerialDevices::default();
        let result = devices.open_channel("/dev/modemlink-does-not-exist0").await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
