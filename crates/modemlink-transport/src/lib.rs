//! Transport implementations for modemlink.
//!
//! This crate provides the production implementations of the device seams
//! defined in `modemlink-core`:
//!
//! - [`SerialTransport`]: the raw modem UART used for the mux handshake
//! - [`SerialDevices`]: a [`DeviceProvider`](modemlink_core::DeviceProvider)
//!   opening the raw device and the multiplexed channel devices
//! - [`LocalSocketTransport`] / [`LocalSocketConnector`]: the modem
//!   management endpoint on a local Unix socket

pub mod local;
pub mod serial;

pub use local::{LocalSocketConnector, LocalSocketTransport};
pub use serial::{
    DataBits, FlowControl, Parity, SerialConfig, SerialDevices, SerialTransport, StopBits,
};
