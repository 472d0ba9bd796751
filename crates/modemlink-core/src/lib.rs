//! modemlink-core: Core traits, types, and error definitions for modemlink.
//!
//! This crate defines the abstractions shared by the AT protocol engine,
//! the transports, and the bridge supervisor. The telephony framework layer
//! depends on these types without pulling in device code.
//!
//! # Key types
//!
//! - [`Transport`], [`DeviceProvider`], [`ManagementConnector`] -- device seams
//! - [`BridgeEvent`] -- upward state change notifications
//! - [`ModemState`], [`RadioState`], [`SlotId`] -- readiness model
//! - [`admit`] -- request admission policy
//! - [`Error`] / [`Result`] -- error handling

pub mod admission;
pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use admission::{Admission, RejectReason, RequestKind, admit};
pub use error::{Error, Result};
pub use events::BridgeEvent;
pub use transport::{
    ChannelIo, ChannelReader, ChannelWriter, DeviceProvider, ManagementConnector, Transport,
};
pub use types::*;
