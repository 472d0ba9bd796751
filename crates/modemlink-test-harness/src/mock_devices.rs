//! Mock channel devices backed by in-memory pipes.
//!
//! [`MockDevices`] implements [`DeviceProvider`]. Every opened channel is a
//! [`tokio::io::duplex`] pipe whose far end is driven by a small simulated
//! modem task: it answers each CR-terminated command with a scripted reply
//! (`OK` unless told otherwise) and lets the test inject unsolicited bytes
//! or hang the channel up.
//!
//! Raw devices for the handshake are queued [`MockTransport`]s.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use modemlink_core::error::{Error, Result};
use modemlink_core::transport::{ChannelIo, DeviceProvider, Transport};

use crate::mock_serial::MockTransport;

/// Reply sent for commands with no scripted reply.
pub const DEFAULT_REPLY: &str = "\r\nOK\r\n";

enum Control {
    Inject(Vec<u8>),
    HangUp,
}

#[derive(Default)]
struct DevicesState {
    raw: VecDeque<MockTransport>,
    raw_failures: usize,
    raw_opens: Vec<String>,
    channel_failures: HashMap<String, usize>,
    channel_opens: Vec<String>,
    /// (command prefix, reply); `None` means the modem stays silent.
    replies: Vec<(String, Option<String>)>,
    commands: Vec<(String, String)>,
    controls: HashMap<String, mpsc::UnboundedSender<Control>>,
}

impl DevicesState {
    fn reply_for(&self, command: &str) -> Option<String> {
        self.replies
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Some(DEFAULT_REPLY.to_string()))
    }
}

/// Scriptable [`DeviceProvider`] for bridge and multiplexer tests.
///
/// Cloning shares the underlying state, so a test can keep one handle
/// while the code under test owns another.
#[derive(Clone, Default)]
pub struct MockDevices {
    state: Arc<Mutex<DevicesState>>,
}

impl MockDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transport returned by the next `open_raw()`.
    pub fn push_raw(&self, transport: MockTransport) {
        self.state.lock().raw.push_back(transport);
    }

    /// Make the next `count` `open_raw()` calls fail.
    pub fn fail_raw_opens(&self, count: usize) {
        self.state.lock().raw_failures = count;
    }

    /// Make the next `count` opens of `path` fail.
    pub fn fail_channel_opens(&self, path: &str, count: usize) {
        self.state
            .lock()
            .channel_failures
            .insert(path.to_string(), count);
    }

    /// Answer commands starting with `prefix` with `reply` (raw bytes,
    /// terminators included). Earlier scripts take precedence.
    pub fn reply(&self, prefix: &str, reply: &str) {
        self.state
            .lock()
            .replies
            .push((prefix.to_string(), Some(reply.to_string())));
    }

    /// Never answer commands starting with `prefix`.
    pub fn silence(&self, prefix: &str) {
        self.state.lock().replies.push((prefix.to_string(), None));
    }

    /// Write `bytes` from the modem side of `path`. Returns `false` if the
    /// channel is not open.
    pub fn inject(&self, path: &str, bytes: &[u8]) -> bool {
        self.control(path, Control::Inject(bytes.to_vec()))
    }

    /// Close the modem side of `path`, as a dying mux driver would.
    pub fn hang_up(&self, path: &str) -> bool {
        let sent = self.control(path, Control::HangUp);
        self.state.lock().controls.remove(path);
        sent
    }

    fn control(&self, path: &str, control: Control) -> bool {
        self.state
            .lock()
            .controls
            .get(path)
            .is_some_and(|tx| tx.send(control).is_ok())
    }

    /// Paths passed to `open_raw()`, including failed attempts.
    pub fn raw_opens(&self) -> Vec<String> {
        self.state.lock().raw_opens.clone()
    }

    /// Paths passed to `open_channel()`, including failed attempts.
    pub fn channel_opens(&self) -> Vec<String> {
        self.state.lock().channel_opens.clone()
    }

    /// Every (path, command) the simulated modems received, in order.
    pub fn commands(&self) -> Vec<(String, String)> {
        self.state.lock().commands.clone()
    }

    /// Commands received on `path`.
    pub fn commands_on(&self, path: &str) -> Vec<String> {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

#[async_trait]
impl DeviceProvider for MockDevices {
    async fn open_raw(&self, path: &str) -> Result<Box<dyn Transport>> {
        let mut state = self.state.lock();
        state.raw_opens.push(path.to_string());
        if state.raw_failures > 0 {
            state.raw_failures -= 1;
            return Err(Error::Transport(format!("mock raw open failed: {path}")));
        }
        match state.raw.pop_front() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(Error::Transport(format!("no raw device queued: {path}"))),
        }
    }

    async fn open_channel(&self, path: &str) -> Result<ChannelIo> {
        let control_rx = {
            let mut state = self.state.lock();
            state.channel_opens.push(path.to_string());
            if let Some(remaining) = state.channel_failures.get_mut(path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::Transport(format!("mock open failed: {path}")));
                }
            }
            let (control_tx, control_rx) = mpsc::unbounded_channel();
            state.controls.insert(path.to_string(), control_tx);
            control_rx
        };

        let (host, modem) = tokio::io::duplex(4096);
        tokio::spawn(run_modem(
            path.to_string(),
            modem,
            control_rx,
            Arc::clone(&self.state),
        ));

        let (reader, writer) = tokio::io::split(host);
        Ok(ChannelIo {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}

/// The simulated modem end of one channel.
async fn run_modem(
    path: String,
    stream: DuplexStream,
    mut control: mpsc::UnboundedReceiver<Control>,
    state: Arc<Mutex<DevicesState>>,
) {
    let (mut rd, mut wr) = tokio::io::split(stream);
    let mut pending = Vec::new();
    let mut buf = [0u8; 512];

    loop {
        tokio::select! {
            read = rd.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                pending.extend_from_slice(&buf[..n]);
                while let Some(pos) = pending.iter().position(|&b| b == b'\r' || b == 0x1a) {
                    let raw: Vec<u8> = pending.drain(..=pos).collect();
                    let command = String::from_utf8_lossy(&raw[..pos]).into_owned();
                    let reply = {
                        let mut state = state.lock();
                        state.commands.push((path.clone(), command.clone()));
                        state.reply_for(&command)
                    };
                    tracing::trace!(path = %path, command = %command, "mock modem received");
                    if let Some(reply) = reply {
                        if wr.write_all(reply.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            }
            msg = control.recv() => match msg {
                Some(Control::Inject(bytes)) => {
                    if wr.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                Some(Control::HangUp) | None => break,
            }
        }
    }
    tracing::trace!(path = %path, "mock modem channel closed");
}
