//! AT protocol engine for modemlink.
//!
//! This crate turns the byte streams of logical modem channels into framed
//! lines and correlates those lines with the commands issued on each
//! channel. It knows nothing about devices or slots beyond the names it is
//! handed; the bridge crate owns the read loops and wiring.
//!
//! # Architecture
//!
//! - [`framer`] -- CR/LF line framing with the `"> "` prompt exception
//! - [`protocol`] -- final-line tokens and line classification
//! - [`timeout`] -- ordered per-command timeout table
//! - [`channel`] -- one pending command per channel, unsolicited routing

pub mod channel;
pub mod framer;
pub mod protocol;
pub mod timeout;

pub use channel::{
    Channel, ChannelContext, EventUnsolicitedHandler, NullUnsolicitedHandler, Response,
    UnsolicitedHandler,
};
pub use framer::{LineBuffer, LineReader};
pub use protocol::{LineClass, classify};
pub use timeout::{TimeoutEntry, TimeoutPolicy};
