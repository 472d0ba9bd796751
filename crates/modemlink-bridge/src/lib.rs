//! Modem bridge runtime for modemlink.
//!
//! This crate wires the AT engine from `modemlink-at` to real (or mocked)
//! devices and keeps it in step with the modem's life:
//!
//! - **Slot state** ([`state`]) -- per-slot radio/modem readiness, held in
//!   watch cells, with events emitted on real changes.
//! - **Handshake** ([`handshake`]) -- switches the raw device into
//!   multiplexed mode every time the modem comes alive.
//! - **Lifecycle monitor** ([`monitor`]) -- follows the management
//!   endpoint's notices, runs the handshake, and reports a stuck modem.
//! - **Multiplexer** ([`mux`]) -- opens a slot's logical channels, reads
//!   them concurrently, and feeds lines to their correlators.
//! - **Bridge** ([`bridge`]) -- readiness queries, request admission, and
//!   command dispatch for the framework-facing side.
//! - **Builder** ([`builder`]) -- fluent configuration and startup.
//!
//! # Example
//!
//! ```no_run
//! use modemlink_bridge::BridgeBuilder;
//! use modemlink_core::{RequestKind, SlotId};
//!
//! # async fn example() -> modemlink_core::Result<()> {
//! let bridge = BridgeBuilder::new().build()?;
//! let mut events = bridge.subscribe();
//!
//! if bridge.admit(SlotId::PRIMARY, RequestKind::SignalStrength)?.into_result().is_ok() {
//!     let csq = bridge.send(SlotId::PRIMARY, 0, "AT+CSQ", Some("+CSQ:")).await?;
//!     println!("{:?}", csq.single_line());
//! }
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod builder;
pub mod handshake;
pub mod monitor;
pub mod mux;
pub mod state;

pub use bridge::Bridge;
pub use builder::{BridgeBuilder, DEFAULT_MANAGEMENT_SOCKET};
pub use handshake::{HandshakeConfig, ModemHandshake, MuxHandshake};
pub use monitor::{LifecycleMonitor, MonitorConfig, MonitorHandle, Watchdog, parse_notice};
pub use mux::{LoopExit, Multiplexer, MultiplexerConfig};
pub use state::{Slot, SlotState, SlotTable};
