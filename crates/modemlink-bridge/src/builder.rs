//! BridgeBuilder -- fluent builder for constructing a running [`Bridge`].
//!
//! Separates configuration from startup so that callers can set device
//! paths, slot layout, handshake literals and timeouts before any task is
//! spawned. Devices and the management endpoint default to the serial and
//! local-socket implementations from `modemlink-transport`; tests inject
//! mocks instead.
//!
//! # Example
//!
//! ```no_run
//! use modemlink_bridge::BridgeBuilder;
//!
//! # async fn example() -> modemlink_core::Result<()> {
//! let bridge = BridgeBuilder::new()
//!     .base_path("/dev/ts0710mux")
//!     .raw_device("/dev/ttyS1")
//!     .slots(2)
//!     .dual_sim(true)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use modemlink_at::{ChannelContext, EventUnsolicitedHandler, TimeoutPolicy, UnsolicitedHandler};
use modemlink_at::framer::{DEFAULT_BUFFER_SIZE, DEFAULT_ZERO_READ_BACKOFF, DEFAULT_ZERO_READ_RETRIES};
use modemlink_core::error::{Error, Result};
use modemlink_core::transport::{DeviceProvider, ManagementConnector};
use modemlink_transport::{LocalSocketConnector, SerialDevices};

use crate::bridge::Bridge;
use crate::handshake::{HandshakeConfig, ModemHandshake, MuxHandshake};
use crate::monitor::{LifecycleMonitor, MonitorConfig};
use crate::mux::{Multiplexer, MultiplexerConfig};
use crate::state::SlotTable;

/// Default management socket path.
pub const DEFAULT_MANAGEMENT_SOCKET: &str = "/dev/socket/modemd";

/// Fluent builder for [`Bridge`].
///
/// Every setting has a default, so the simplest usage is
/// `BridgeBuilder::new().build()`.
pub struct BridgeBuilder {
    base_path: String,
    slots: u8,
    channels_per_slot: usize,
    management_socket: PathBuf,
    handshake: HandshakeConfig,
    retry_interval: Duration,
    reconnect_interval: Duration,
    timeout_policy: TimeoutPolicy,
    init_commands: Vec<String>,
    event_capacity: usize,
    buffer_size: usize,
    zero_read_retries: u32,
    zero_read_backoff: Duration,
    devices: Option<Arc<dyn DeviceProvider>>,
    connector: Option<Arc<dyn ManagementConnector>>,
    handshake_impl: Option<Arc<dyn ModemHandshake>>,
    unsolicited: Option<Arc<dyn UnsolicitedHandler>>,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        let mux = MultiplexerConfig::default();
        BridgeBuilder {
            base_path: mux.base_path,
            slots: 1,
            channels_per_slot: mux.indices.len(),
            management_socket: PathBuf::from(DEFAULT_MANAGEMENT_SOCKET),
            handshake: HandshakeConfig::default(),
            retry_interval: mux.retry_interval,
            reconnect_interval: MonitorConfig::default().reconnect_interval,
            timeout_policy: TimeoutPolicy::default(),
            init_commands: mux.init_commands,
            event_capacity: 256,
            buffer_size: DEFAULT_BUFFER_SIZE,
            zero_read_retries: DEFAULT_ZERO_READ_RETRIES,
            zero_read_backoff: DEFAULT_ZERO_READ_BACKOFF,
            devices: None,
            connector: None,
            handshake_impl: None,
            unsolicited: None,
        }
    }

    /// Channel device prefix (default `/dev/ts0710mux`).
    pub fn base_path(mut self, path: &str) -> Self {
        self.base_path = path.to_string();
        self
    }

    /// Number of radio slots (default 1).
    pub fn slots(mut self, count: u8) -> Self {
        self.slots = count;
        self
    }

    /// Logical channels per slot (default 4). Slot `n` owns channel indices
    /// `n * count .. (n + 1) * count`.
    pub fn channels_per_slot(mut self, count: usize) -> Self {
        self.channels_per_slot = count;
        self
    }

    /// Raw pre-multiplex device (default `/dev/ttyS1`).
    pub fn raw_device(mut self, path: &str) -> Self {
        self.handshake.raw_path = path.to_string();
        self
    }

    /// Management endpoint socket path, used when no connector is given.
    pub fn management_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.management_socket = path.into();
        self
    }

    /// Run the modem in dual-SIM mode (default: single).
    pub fn dual_sim(mut self, enabled: bool) -> Self {
        self.handshake.dual_sim = enabled;
        self
    }

    /// Override the mode-select literals sent during the handshake.
    pub fn sim_mode_commands(mut self, single: &str, dual: &str) -> Self {
        self.handshake.single_sim_command = single.to_string();
        self.handshake.dual_sim_command = dual.to_string();
        self
    }

    /// Override the command that starts the multiplexer (default `AT+CMUX=0`).
    pub fn mux_command(mut self, command: &str) -> Self {
        self.handshake.mux_command = command.to_string();
        self
    }

    /// Raw device open attempts and the pause between them (default 3, 1 s).
    pub fn raw_open_retries(mut self, attempts: u32, interval: Duration) -> Self {
        self.handshake.open_attempts = attempts;
        self.handshake.open_retry_interval = interval;
        self
    }

    /// Bound each handshake command (default: wait indefinitely).
    pub fn handshake_deadline(mut self, deadline: Duration) -> Self {
        self.handshake.command_deadline = Some(deadline);
        self
    }

    /// Pause before retrying a failed channel bring-up (default 1 s).
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Pause between management reconnect attempts (default 2 s).
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Replace the command timeout table.
    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// Commands run once channels are up (default `ATE0Q0V1`, `AT+CMEE=1`).
    pub fn init_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.init_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Capacity of the event broadcast channel (default 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Per-channel read buffer size (default 8 KiB).
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Zero-length reads tolerated per channel before it counts as closed.
    pub fn zero_read_policy(mut self, retries: u32, backoff: Duration) -> Self {
        self.zero_read_retries = retries;
        self.zero_read_backoff = backoff;
        self
    }

    /// Use a custom device provider instead of serial devices.
    pub fn devices(mut self, devices: Arc<dyn DeviceProvider>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Use a custom management connector instead of the local socket.
    pub fn connector(mut self, connector: Arc<dyn ManagementConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the handshake run on every modem-alive transition.
    pub fn handshake(mut self, handshake: Arc<dyn ModemHandshake>) -> Self {
        self.handshake_impl = Some(handshake);
        self
    }

    /// Where unsolicited lines go (default: [`EventUnsolicitedHandler`]).
    pub fn unsolicited_handler(mut self, handler: Arc<dyn UnsolicitedHandler>) -> Self {
        self.unsolicited = Some(handler);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.slots == 0 {
            return Err(Error::InvalidParameter("at least one slot is required".into()));
        }
        if self.channels_per_slot == 0 {
            return Err(Error::InvalidParameter(
                "at least one channel per slot is required".into(),
            ));
        }
        if self.base_path.is_empty() {
            return Err(Error::InvalidParameter("base_path must not be empty".into()));
        }
        if self.handshake.raw_path.is_empty() {
            return Err(Error::InvalidParameter("raw_device must not be empty".into()));
        }
        if self.handshake.dual_sim && self.slots < 2 {
            return Err(Error::InvalidParameter("dual_sim requires at least two slots".into()));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter("event_capacity must be non-zero".into()));
        }
        Ok(())
    }

    /// Validate the configuration and start the bridge.
    ///
    /// Spawns the lifecycle monitor and one supervisor per slot, so this
    /// must be called from within a tokio runtime.
    pub fn build(self) -> Result<Bridge> {
        self.validate()?;

        let devices = self
            .devices
            .unwrap_or_else(|| Arc::new(SerialDevices::default()));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(LocalSocketConnector::new(self.management_socket)));
        let handshake = self
            .handshake_impl
            .unwrap_or_else(|| Arc::new(MuxHandshake::new(Arc::clone(&devices), self.handshake)));

        let (event_tx, _) = broadcast::channel(self.event_capacity);
        let table = Arc::new(SlotTable::new(self.slots, event_tx.clone()));
        let context = ChannelContext {
            policy: Arc::new(self.timeout_policy),
            unsolicited: self
                .unsolicited
                .unwrap_or_else(|| Arc::new(EventUnsolicitedHandler)),
            event_tx: event_tx.clone(),
        };

        let monitor = LifecycleMonitor::new(
            Arc::clone(&table),
            connector,
            handshake,
            MonitorConfig {
                reconnect_interval: self.reconnect_interval,
                ..Default::default()
            },
        );
        let watchdog = monitor.watchdog();

        let shutdown = CancellationToken::new();
        let supervisors = table
            .slots()
            .iter()
            .map(|slot| {
                let first = usize::from(slot.id().index()) * self.channels_per_slot;
                let mux = Multiplexer::new(
                    Arc::clone(slot),
                    Arc::clone(&devices),
                    context.clone(),
                    watchdog.clone(),
                    MultiplexerConfig {
                        base_path: self.base_path.clone(),
                        indices: first..first + self.channels_per_slot,
                        retry_interval: self.retry_interval,
                        init_commands: self.init_commands.clone(),
                        buffer_size: self.buffer_size,
                        zero_read_retries: self.zero_read_retries,
                        zero_read_backoff: self.zero_read_backoff,
                    },
                );
                tokio::spawn(mux.supervise(shutdown.clone()))
            })
            .collect();

        tracing::info!(
            slots = self.slots,
            channels_per_slot = self.channels_per_slot,
            base_path = %self.base_path,
            "bridge started"
        );

        Ok(Bridge::new(
            table,
            event_tx,
            context.policy,
            monitor.spawn(),
            supervisors,
            shutdown,
        ))
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
