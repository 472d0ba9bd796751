//! Switching the modem into multiplexed mode.
//!
//! Every time the modem comes alive, the raw device must be told which SIM
//! mode to run in and then asked to start the multiplexer. Only after that
//! do the logical channel devices exist.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use modemlink_core::error::{Error, Result};
use modemlink_core::transport::{DeviceProvider, Transport};

/// Runs the pre-multiplex handshake. The lifecycle monitor calls this on
/// every offline-to-alive transition.
#[async_trait]
pub trait ModemHandshake: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// Handshake configuration.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Raw (pre-multiplex) device path.
    pub raw_path: String,
    /// Selects `dual_sim_command` instead of `single_sim_command`.
    pub dual_sim: bool,
    pub single_sim_command: String,
    pub dual_sim_command: String,
    /// Command that starts the multiplexer.
    pub mux_command: String,
    /// Raw device open attempts before giving up.
    pub open_attempts: u32,
    /// Pause between open attempts.
    pub open_retry_interval: Duration,
    /// Length of one receive wait. Silence only restarts the wait.
    pub receive_timeout: Duration,
    /// Give up on a command after this long without a final answer.
    /// `None` waits indefinitely.
    pub command_deadline: Option<Duration>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            raw_path: "/dev/ttyS1".into(),
            dual_sim: false,
            single_sim_command: "AT+SIMMODE=0".into(),
            dual_sim_command: "AT+SIMMODE=1".into(),
            mux_command: "AT+CMUX=0".into(),
            open_attempts: 3,
            open_retry_interval: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(1),
            command_deadline: None,
        }
    }
}

/// The production handshake over a [`DeviceProvider`]'s raw device.
pub struct MuxHandshake {
    devices: Arc<dyn DeviceProvider>,
    config: HandshakeConfig,
}

impl MuxHandshake {
    pub fn new(devices: Arc<dyn DeviceProvider>, config: HandshakeConfig) -> Self {
        Self { devices, config }
    }

    /// The two commands issued, in order.
    pub fn commands(&self) -> [&str; 2] {
        let mode = if self.config.dual_sim {
            &self.config.dual_sim_command
        } else {
            &self.config.single_sim_command
        };
        [mode.as_str(), self.config.mux_command.as_str()]
    }

    async fn open_raw(&self) -> Result<Box<dyn Transport>> {
        let path = &self.config.raw_path;
        let attempts = self.config.open_attempts.max(1);
        for attempt in 1..=attempts {
            match self.devices.open_raw(path).await {
                Ok(transport) => return Ok(transport),
                Err(e) => {
                    warn!(path = %path, attempt, attempts, error = %e, "failed to open raw device");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.open_retry_interval).await;
                    }
                }
            }
        }
        error!(path = %path, "giving up on raw device");
        Err(Error::HandshakeFailed(format!("cannot open {path}")))
    }

    /// Write one command and wait for `OK` or `ERROR` in the reply.
    async fn exchange(&self, transport: &mut dyn Transport, command: &str) -> Result<()> {
        debug!(command, "handshake command");
        transport
            .send(format!("{command}\r").as_bytes())
            .await
            .map_err(|e| Error::HandshakeFailed(format!("{command}: write failed: {e}")))?;

        let started = tokio::time::Instant::now();
        let mut reply = String::new();
        let mut buf = [0u8; 256];
        loop {
            if let Some(deadline) = self.config.command_deadline {
                if started.elapsed() >= deadline {
                    return Err(Error::HandshakeFailed(format!("{command}: no answer")));
                }
            }
            match transport.receive(&mut buf, self.config.receive_timeout).await {
                Err(Error::Timeout) => continue,
                Ok(0) => {
                    return Err(Error::HandshakeFailed(format!("{command}: device closed")));
                }
                Ok(n) => {
                    reply.push_str(&String::from_utf8_lossy(&buf[..n]));
                    if reply.contains("OK") {
                        debug!(command, "handshake command accepted");
                        return Ok(());
                    }
                    if reply.contains("ERROR") {
                        return Err(Error::HandshakeFailed(format!(
                            "{command}: {}",
                            reply.trim()
                        )));
                    }
                }
                Err(e) => {
                    return Err(Error::HandshakeFailed(format!("{command}: {e}")));
                }
            }
        }
    }
}

#[async_trait]
impl ModemHandshake for MuxHandshake {
    async fn run(&self) -> Result<()> {
        let mut transport = self.open_raw().await?;

        let mut result = Ok(());
        for command in self.commands() {
            result = self.exchange(transport.as_mut(), command).await;
            if result.is_err() {
                break;
            }
        }

        if let Err(e) = transport.close().await {
            debug!(error = %e, "closing raw device failed");
        }

        match &result {
            Ok(()) => info!(path = %self.config.raw_path, "modem switched to multiplexed mode"),
            Err(e) => error!(path = %self.config.raw_path, error = %e, "handshake failed"),
        }
        result
    }
}
