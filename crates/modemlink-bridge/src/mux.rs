//! Per-slot channel multiplexer.
//!
//! A slot talks to the modem over several logical channel devices,
//! `<base-path><index>` for a fixed index range. The [`Multiplexer`] opens
//! them all once the modem is alive, then runs a single read loop that
//! waits on every channel at once and feeds framed lines to the matching
//! [`Channel`] correlator.
//!
//! [`Multiplexer::supervise`] is the slot's long-running task: wait for
//! the modem, bring channels up, run the loop until the modem goes away or
//! a channel dies, tear down, repeat.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use modemlink_at::framer::{
    DEFAULT_BUFFER_SIZE, DEFAULT_ZERO_READ_BACKOFF, DEFAULT_ZERO_READ_RETRIES,
};
use modemlink_at::{Channel, ChannelContext, LineReader};
use modemlink_core::error::Result;
use modemlink_core::transport::{ChannelIo, ChannelReader, DeviceProvider};
use modemlink_core::types::{ModemState, RadioState};

use crate::monitor::Watchdog;
use crate::state::Slot;

/// Multiplexer configuration for one slot.
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Channel device path prefix; the index is appended.
    pub base_path: String,
    /// Channel indices owned by this slot, opened in ascending order.
    pub indices: Range<usize>,
    /// Pause before retrying a failed bring-up from the first index.
    pub retry_interval: Duration,
    /// Commands run on the first channel once all channels are open.
    pub init_commands: Vec<String>,
    /// Read buffer size per channel.
    pub buffer_size: usize,
    pub zero_read_retries: u32,
    pub zero_read_backoff: Duration,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            base_path: "/dev/ts0710mux".into(),
            indices: 0..4,
            retry_interval: Duration::from_secs(1),
            init_commands: vec!["ATE0Q0V1".into(), "AT+CMEE=1".into()],
            buffer_size: DEFAULT_BUFFER_SIZE,
            zero_read_retries: DEFAULT_ZERO_READ_RETRIES,
            zero_read_backoff: DEFAULT_ZERO_READ_BACKOFF,
        }
    }
}

/// Why the read loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The slot's reader token was cancelled.
    Cancelled,
    /// The named channel hit EOF or a read error.
    ChannelClosed(String),
}

type ReadOutcome = (usize, LineReader<ChannelReader>, Result<usize>);

fn read_next(
    index: usize,
    mut reader: LineReader<ChannelReader>,
) -> BoxFuture<'static, ReadOutcome> {
    Box::pin(async move {
        let result = reader.fill().await;
        (index, reader, result)
    })
}

/// Owns the channels of one slot.
pub struct Multiplexer {
    slot: Arc<Slot>,
    devices: Arc<dyn DeviceProvider>,
    context: ChannelContext,
    watchdog: Watchdog,
    config: MultiplexerConfig,
}

impl Multiplexer {
    pub fn new(
        slot: Arc<Slot>,
        devices: Arc<dyn DeviceProvider>,
        context: ChannelContext,
        watchdog: Watchdog,
        config: MultiplexerConfig,
    ) -> Self {
        Self {
            slot,
            devices,
            context,
            watchdog,
            config,
        }
    }

    /// Device path of channel `index`.
    pub fn channel_path(&self, index: usize) -> String {
        format!("{}{}", self.config.base_path, index)
    }

    /// Open every channel device in order. On the first failure, everything
    /// opened so far is dropped (closing it) and the error returned.
    async fn open_all(&self) -> Result<Vec<(String, ChannelIo)>> {
        let mut opened = Vec::with_capacity(self.config.indices.len());
        for index in self.config.indices.clone() {
            let path = self.channel_path(index);
            match self.devices.open_channel(&path).await {
                Ok(io) => opened.push((path, io)),
                Err(e) => {
                    warn!(slot = %self.slot.id(), path = %path, error = %e, "failed to open channel");
                    return Err(e);
                }
            }
        }
        Ok(opened)
    }

    /// Open the whole channel range, retrying from the start until it
    /// succeeds. Returns `None` if `cancel` fires first.
    pub async fn bring_up(
        &self,
        cancel: &CancellationToken,
    ) -> Option<(Vec<Arc<Channel>>, Vec<LineReader<ChannelReader>>)> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Ok(opened) = self.open_all().await {
                let mut channels = Vec::with_capacity(opened.len());
                let mut readers = Vec::with_capacity(opened.len());
                for (path, io) in opened {
                    readers.push(
                        LineReader::new(path.clone(), io.reader)
                            .buffer_size(self.config.buffer_size)
                            .zero_read_policy(
                                self.config.zero_read_retries,
                                self.config.zero_read_backoff,
                            ),
                    );
                    channels.push(Arc::new(Channel::new(
                        self.slot.id(),
                        path,
                        io.writer,
                        self.context.clone(),
                    )));
                }
                info!(slot = %self.slot.id(), channels = channels.len(), "channels open");
                return Some((channels, readers));
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.config.retry_interval) => {}
            }
        }
    }

    /// Wait on every channel at once, draining all framed lines of each
    /// ready channel before reading from it again.
    pub async fn run_loop(
        &self,
        channels: &[Arc<Channel>],
        readers: Vec<LineReader<ChannelReader>>,
        cancel: &CancellationToken,
    ) -> LoopExit {
        let mut pending: FuturesUnordered<_> = readers
            .into_iter()
            .enumerate()
            .map(|(index, reader)| read_next(index, reader))
            .collect();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return LoopExit::Cancelled,
                next = pending.next() => match next {
                    Some((index, mut reader, Ok(_))) => {
                        while let Some(line) = reader.take_line() {
                            channels[index].on_line(line).await;
                        }
                        pending.push(read_next(index, reader));
                    }
                    Some((_, reader, Err(e))) => {
                        warn!(slot = %self.slot.id(), channel = %reader.name(), error = %e, "channel closed");
                        return LoopExit::ChannelClosed(reader.name().to_string());
                    }
                    None => {
                        // No channels: nothing to read until woken.
                        cancel.cancelled().await;
                        return LoopExit::Cancelled;
                    }
                },
            }
        }
    }

    /// Run the init commands on the first channel, then report the radio
    /// as reachable but off.
    async fn post_alive_init(&self, channels: &[Arc<Channel>]) {
        if let Some(first) = channels.first() {
            for command in &self.config.init_commands {
                match first.send_with_policy(command, None).await {
                    Ok(response) if response.success => {
                        debug!(slot = %self.slot.id(), command = %command, "init command ok");
                    }
                    Ok(response) => warn!(
                        slot = %self.slot.id(),
                        command = %command,
                        final_line = %response.final_line,
                        "init command rejected"
                    ),
                    Err(e) => warn!(slot = %self.slot.id(), command = %command, error = %e, "init command failed"),
                }
            }
        }
        self.slot.set_radio_state(RadioState::Off);
    }

    /// The slot supervisor loop. Returns once `shutdown` is cancelled.
    pub async fn supervise(self, shutdown: CancellationToken) {
        let slot = Arc::clone(&self.slot);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = slot.wait_for_modem_alive() => {}
            }

            let reader_cancel = shutdown.child_token();
            slot.install_reader(reader_cancel.clone());
            if slot.modem_state() != ModemState::Alive {
                // Went offline between the wake-up and the install.
                slot.clear_reader();
                continue;
            }

            let Some((channels, readers)) = self.bring_up(&reader_cancel).await else {
                slot.clear_reader();
                continue;
            };
            slot.set_channels(channels.clone());
            slot.set_channels_ready(true);

            let run = self.run_loop(&channels, readers, &reader_cancel);
            let init = self.post_alive_init(&channels);
            tokio::pin!(run, init);
            let mut init_done = false;
            let exit = loop {
                tokio::select! {
                    exit = &mut run => break exit,
                    _ = &mut init, if !init_done => init_done = true,
                }
            };

            slot.clear_reader();
            slot.set_channels_ready(false);
            slot.clear_channels();

            match exit {
                LoopExit::ChannelClosed(name) => {
                    warn!(slot = %slot.id(), channel = %name, "channel lost, reporting unresponsive modem");
                    self.watchdog.poke();
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.retry_interval) => {}
                    }
                }
                LoopExit::Cancelled => {
                    info!(slot = %slot.id(), "channels released");
                }
            }
        }
        slot.clear_reader();
        slot.clear_channels();
        debug!(slot = %slot.id(), "slot supervisor stopped");
    }
}
