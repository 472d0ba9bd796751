//! Per-channel command/response correlation.
//!
//! A [`Channel`] pairs the write half of one logical modem channel with at
//! most one outstanding command. Issuers call [`Channel::send`]; the slot's
//! multiplexer feeds every framed line from the read half into
//! [`Channel::on_line`], which either completes the pending command or
//! routes the line to the [`UnsolicitedHandler`].
//!
//! Issuers are serialized per channel: a second `send` while a command is
//! outstanding fails with [`Error::AlreadyPending`] instead of queueing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace, warn};

use modemlink_core::error::{Error, Result};
use modemlink_core::events::BridgeEvent;
use modemlink_core::transport::ChannelWriter;
use modemlink_core::types::SlotId;

use crate::framer::PROMPT;
use crate::protocol::{self, COMMAND_TERMINATOR, CTRL_Z, LineClass};
use crate::timeout::TimeoutPolicy;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The complete reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Whether the final line was a success token.
    pub success: bool,
    /// The final line (`OK`, `+CME ERROR: 10`, ...).
    pub final_line: String,
    /// Data lines in the order they were received.
    pub intermediates: Vec<String>,
}

impl Response {
    /// The only data line, for single-line queries like `AT+CSQ`.
    pub fn single_line(&self) -> Option<&str> {
        match self.intermediates.as_slice() {
            [line] => Some(line),
            _ => None,
        }
    }

    /// Turn an error-class final line into [`Error::Protocol`].
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::Protocol(self.final_line))
        }
    }
}

/// Callback for lines that do not belong to a pending command.
///
/// The bridge installs one handler for all channels; feature code that
/// parses `+CREG:`, `RING` and friends plugs in here.
pub trait UnsolicitedHandler: Send + Sync + 'static {
    fn process(
        &self,
        slot: SlotId,
        channel: &str,
        line: &str,
        event_tx: &broadcast::Sender<BridgeEvent>,
    );
}

/// Drops unsolicited lines.
pub struct NullUnsolicitedHandler;

impl UnsolicitedHandler for NullUnsolicitedHandler {
    fn process(&self, _: SlotId, _: &str, _: &str, _: &broadcast::Sender<BridgeEvent>) {}
}

/// Forwards unsolicited lines upward as [`BridgeEvent::Unsolicited`].
pub struct EventUnsolicitedHandler;

impl UnsolicitedHandler for EventUnsolicitedHandler {
    fn process(
        &self,
        slot: SlotId,
        channel: &str,
        line: &str,
        event_tx: &broadcast::Sender<BridgeEvent>,
    ) {
        let _ = event_tx.send(BridgeEvent::Unsolicited {
            slot,
            channel: channel.to_string(),
            line: line.to_string(),
        });
    }
}

/// Collaborators shared by every channel of a bridge.
#[derive(Clone)]
pub struct ChannelContext {
    /// Timeout table for [`Channel::send_with_policy`].
    pub policy: Arc<TimeoutPolicy>,
    /// Where unsolicited lines go.
    pub unsolicited: Arc<dyn UnsolicitedHandler>,
    /// Upward event channel handed to the unsolicited handler.
    pub event_tx: broadcast::Sender<BridgeEvent>,
}

/// The command currently awaiting its final line.
struct PendingCommand {
    command: String,
    response_prefix: Option<String>,
    /// Newest first; reversed once when the reply completes.
    intermediates: VecDeque<String>,
    final_line: Option<String>,
    success: bool,
    pdu: Option<String>,
    done: Option<oneshot::Sender<()>>,
}

impl PendingCommand {
    fn is_complete(&self) -> bool {
        self.final_line.is_some()
    }

    fn into_response(self) -> Response {
        // Receipt order is the reverse of insertion order.
        let mut intermediates: Vec<String> = self.intermediates.into();
        intermediates.reverse();
        Response {
            success: self.success,
            final_line: self.final_line.unwrap_or_default(),
            intermediates,
        }
    }
}

#[derive(Default)]
struct ChannelState {
    pending: Option<PendingCommand>,
    closed: bool,
}

/// What `on_line` must do once the state lock is released.
enum LineAction {
    None,
    Unsolicited,
    WritePdu(String),
}

/// One logical AT channel of a slot.
pub struct Channel {
    slot: SlotId,
    name: String,
    state: Mutex<ChannelState>,
    writer: tokio::sync::Mutex<ChannelWriter>,
    context: ChannelContext,
}

/// Clears the pending command on every exit path of `send`, including the
/// caller dropping the future mid-wait.
struct PendingGuard<'a> {
    channel: &'a Channel,
    armed: bool,
}

impl PendingGuard<'_> {
    fn take(mut self) -> Option<PendingCommand> {
        self.armed = false;
        self.channel.state.lock().pending.take()
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.channel.state.lock().pending = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

impl Channel {
    /// Wrap the write half of an opened channel device.
    pub fn new(
        slot: SlotId,
        name: impl Into<String>,
        writer: ChannelWriter,
        context: ChannelContext,
    ) -> Self {
        Channel {
            slot,
            name: name.into(),
            state: Mutex::new(ChannelState::default()),
            writer: tokio::sync::Mutex::new(writer),
            context,
        }
    }

    /// Human-readable channel name (the device path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The slot this channel belongs to.
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Whether a command is outstanding.
    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Send `command` and wait up to `timeout` for its final line.
    ///
    /// With a `response_prefix`, only data lines starting with it are
    /// collected; anything else arriving meanwhile is unsolicited.
    pub async fn send(
        &self,
        command: &str,
        response_prefix: Option<&str>,
        timeout: Duration,
    ) -> Result<Response> {
        self.exchange(command, None, response_prefix, timeout).await
    }

    /// [`send`](Self::send) with the timeout taken from the channel's
    /// [`TimeoutPolicy`].
    pub async fn send_with_policy(
        &self,
        command: &str,
        response_prefix: Option<&str>,
    ) -> Result<Response> {
        let timeout = self.context.policy.lookup(command);
        self.exchange(command, None, response_prefix, timeout).await
    }

    /// Send a command that answers with the `"> "` prompt (e.g. `AT+CMGS`),
    /// then type `pdu` followed by Ctrl-Z when the prompt arrives.
    pub async fn send_with_pdu(
        &self,
        command: &str,
        pdu: &str,
        response_prefix: Option<&str>,
        timeout: Duration,
    ) -> Result<Response> {
        self.exchange(command, Some(pdu), response_prefix, timeout)
            .await
    }

    async fn exchange(
        &self,
        command: &str,
        pdu: Option<&str>,
        response_prefix: Option<&str>,
        timeout: Duration,
    ) -> Result<Response> {
        let done_rx = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::ChannelClosed);
            }
            if state.pending.is_some() {
                return Err(Error::AlreadyPending);
            }
            let (done_tx, done_rx) = oneshot::channel();
            state.pending = Some(PendingCommand {
                command: command.to_string(),
                response_prefix: response_prefix.map(str::to_string),
                intermediates: VecDeque::new(),
                final_line: None,
                success: false,
                pdu: pdu.map(str::to_string),
                done: Some(done_tx),
            });
            done_rx
        };
        let guard = PendingGuard {
            channel: self,
            armed: true,
        };

        debug!(channel = %self.name, command, "sending");
        self.write_text(&format!("{command}{COMMAND_TERMINATOR}"))
            .await?;

        match tokio::time::timeout(timeout, done_rx).await {
            Ok(Ok(())) => guard
                .take()
                .map(PendingCommand::into_response)
                .ok_or(Error::ChannelClosed),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                warn!(
                    channel = %self.name,
                    command,
                    timeout_ms = timeout.as_millis(),
                    "command timed out"
                );
                Err(Error::Timeout)
            }
        }
    }

    async fn write_text(&self, text: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let result = match writer.write_all(text.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            warn!(channel = %self.name, error = %e, "channel write failed");
            Error::ChannelClosed
        })
    }

    /// Feed one framed line read from this channel.
    pub async fn on_line(&self, line: String) {
        trace!(channel = %self.name, line = %line, "line");

        let action = {
            let mut state = self.state.lock();
            match state.pending.as_mut().filter(|p| !p.is_complete()) {
                None => LineAction::Unsolicited,
                Some(pending) => match protocol::classify(&line, true) {
                    class @ (LineClass::FinalSuccess | LineClass::FinalError) => {
                        pending.success = class == LineClass::FinalSuccess;
                        debug!(
                            channel = %self.name,
                            command = %pending.command,
                            final_line = %line,
                            "command complete"
                        );
                        pending.final_line = Some(line.clone());
                        if let Some(done) = pending.done.take() {
                            let _ = done.send(());
                        }
                        LineAction::None
                    }
                    _ if line.as_bytes() == PROMPT && pending.pdu.is_some() => {
                        LineAction::WritePdu(pending.pdu.take().unwrap_or_default())
                    }
                    _ => match &pending.response_prefix {
                        Some(prefix) if !line.starts_with(prefix.as_str()) => {
                            LineAction::Unsolicited
                        }
                        _ => {
                            pending.intermediates.push_front(line.clone());
                            LineAction::None
                        }
                    },
                },
            }
        };

        match action {
            LineAction::None => {}
            LineAction::Unsolicited => {
                debug!(channel = %self.name, line = %line, "unsolicited");
                self.context.unsolicited.process(
                    self.slot,
                    &self.name,
                    &line,
                    &self.context.event_tx,
                );
            }
            LineAction::WritePdu(pdu) => {
                if let Err(e) = self.write_text(&format!("{pdu}{CTRL_Z}")).await {
                    debug!(channel = %self.name, error = %e, "failed to send PDU");
                }
            }
        }
    }

    /// Mark the channel closed and abort any pending command with
    /// [`Error::ChannelClosed`].
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        if let Some(pending) = state.pending.take() {
            debug!(channel = %self.name, command = %pending.command, "aborting pending command");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn context(event_tx: broadcast::Sender<BridgeEvent>) -> ChannelContext {
        ChannelContext {
            policy: Arc::new(TimeoutPolicy::default()),
            unsolicited: Arc::new(EventUnsolicitedHandler),
            event_tx,
        }
    }

    /// A channel whose write half is readable by the test as `modem`.
    fn test_channel() -> (Arc<Channel>, DuplexStream, broadcast::Receiver<BridgeEvent>) {
        let (host, modem) = tokio::io::duplex(1024);
        let (event_tx, event_rx) = broadcast::channel(16);
        let channel = Channel::new(SlotId::PRIMARY, "mux0", Box::new(host), context(event_tx));
        (Arc::new(channel), modem, event_rx)
    }

    /// Read one CR-terminated command as written by the channel.
    async fn read_command(modem: &mut DuplexStream) -> String {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            modem.read_exact(&mut byte).await.unwrap();
            if byte[0] == b'\r' || byte[0] == 0x1a {
                out.push(byte[0]);
                return String::from_utf8(out).unwrap();
            }
            out.push(byte[0]);
        }
    }

    fn spawn_send(
        channel: &Arc<Channel>,
        command: &'static str,
        prefix: Option<&'static str>,
        timeout: Duration,
    ) -> tokio::task::JoinHandle<Result<Response>> {
        let channel = Arc::clone(channel);
        tokio::spawn(async move { channel.send(command, prefix, timeout).await })
    }

    #[tokio::test]
    async fn intermediates_are_returned_in_receipt_order() {
        let (channel, mut modem, _events) = test_channel();
        let task = spawn_send(&channel, "AT+CLCC", None, Duration::from_secs(5));

        assert_eq!(read_command(&mut modem).await, "AT+CLCC\r");
        for line in ["+CLCC: 1", "+CLCC: 2", "+CLCC: 3", "+CLCC: 4"] {
            channel.on_line(line.to_string()).await;
        }
        channel.on_line("OK".to_string()).await;

        let response = task.await.unwrap().unwrap();
        assert!(response.success);
        assert_eq!(response.final_line, "OK");
        assert_eq!(
            response.intermediates,
            vec!["+CLCC: 1", "+CLCC: 2", "+CLCC: 3", "+CLCC: 4"]
        );
        assert!(!channel.has_pending());
    }

    #[tokio::test]
    async fn error_final_line_is_an_unsuccessful_response() {
        let (channel, mut modem, _events) = test_channel();
        let task = spawn_send(&channel, "AT+CPIN=0000", None, Duration::from_secs(5));

        read_command(&mut modem).await;
        channel.on_line("+CME ERROR: 16".to_string()).await;

        let response = task.await.unwrap().unwrap();
        assert!(!response.success);
        assert_eq!(response.final_line, "+CME ERROR: 16");
        assert!(matches!(response.into_result(), Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn second_send_fails_fast_with_already_pending() {
        let (channel, mut modem, _events) = test_channel();
        let first = spawn_send(&channel, "AT+CSQ", Some("+CSQ:"), Duration::from_secs(5));
        read_command(&mut modem).await;
        channel.on_line("+CSQ: 20,99".to_string()).await;

        let second = channel
            .send("AT+CREG?", None, Duration::from_secs(5))
            .await;
        assert!(matches!(second, Err(Error::AlreadyPending)));

        channel.on_line("OK".to_string()).await;
        let response = first.await.unwrap().unwrap();
        assert_eq!(response.single_line(), Some("+CSQ: 20,99"));
        assert!(response.success);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_clears_pending_and_channel_is_reusable() {
        let (channel, mut modem, mut events) = test_channel();

        let started = tokio::time::Instant::now();
        let result = channel.send("AT+CGSN", None, Duration::from_secs(3)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert!(!channel.has_pending());
        read_command(&mut modem).await;

        // The late reply to the abandoned command is unsolicited.
        channel.on_line("351234567890123".to_string()).await;
        match events.try_recv().unwrap() {
            BridgeEvent::Unsolicited { line, channel, .. } => {
                assert_eq!(line, "351234567890123");
                assert_eq!(channel, "mux0");
            }
            other => panic!("expected Unsolicited, got {other:?}"),
        }

        let task = spawn_send(&channel, "AT", None, Duration::from_secs(3));
        assert_eq!(read_command(&mut modem).await, "AT\r");
        channel.on_line("OK".to_string()).await;
        assert!(task.await.unwrap().unwrap().success);
    }

    #[tokio::test]
    async fn prefix_hint_routes_foreign_lines_as_unsolicited() {
        let (channel, mut modem, mut events) = test_channel();
        let task = spawn_send(&channel, "AT+CSQ", Some("+CSQ:"), Duration::from_secs(5));

        read_command(&mut modem).await;
        channel.on_line("+CREG: 1".to_string()).await;
        channel.on_line("+CSQ: 17,99".to_string()).await;
        channel.on_line("OK".to_string()).await;

        let response = task.await.unwrap().unwrap();
        assert_eq!(response.intermediates, vec!["+CSQ: 17,99"]);
        assert!(matches!(
            events.try_recv().unwrap(),
            BridgeEvent::Unsolicited { line, .. } if line == "+CREG: 1"
        ));
    }

    #[tokio::test]
    async fn lines_without_pending_command_are_unsolicited() {
        let (channel, _modem, mut events) = test_channel();
        channel.on_line("RING".to_string()).await;
        channel.on_line("OK".to_string()).await;

        let mut lines = Vec::new();
        while let Ok(BridgeEvent::Unsolicited { line, .. }) = events.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines, vec!["RING", "OK"]);
    }

    #[tokio::test]
    async fn prompt_triggers_pdu_then_ctrl_z() {
        let (channel, mut modem, _events) = test_channel();
        let task = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                channel
                    .send_with_pdu("AT+CMGS=21", "0011000B91", Some("+CMGS:"), Duration::from_secs(5))
                    .await
            })
        };

        assert_eq!(read_command(&mut modem).await, "AT+CMGS=21\r");
        channel.on_line("> ".to_string()).await;
        assert_eq!(read_command(&mut modem).await, "0011000B91\x1a");
        channel.on_line("+CMGS: 7".to_string()).await;
        channel.on_line("OK".to_string()).await;

        let response = task.await.unwrap().unwrap();
        assert_eq!(response.intermediates, vec!["+CMGS: 7"]);
    }

    #[tokio::test]
    async fn close_aborts_pending_and_rejects_new_sends() {
        let (channel, mut modem, _events) = test_channel();
        let task = spawn_send(&channel, "AT+COPS?", None, Duration::from_secs(5));
        read_command(&mut modem).await;

        channel.close();
        assert!(matches!(task.await.unwrap(), Err(Error::ChannelClosed)));
        assert!(channel.is_closed());
        assert!(matches!(
            channel.send("AT", None, Duration::from_secs(1)).await,
            Err(Error::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn write_failure_reports_channel_closed_and_clears_pending() {
        let (host, modem) = tokio::io::duplex(64);
        drop(modem);
        let (event_tx, _) = broadcast::channel(4);
        let channel = Channel::new(SlotId::PRIMARY, "mux1", Box::new(host), context(event_tx));

        let result = channel.send("AT", None, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::ChannelClosed)));
        assert!(!channel.has_pending());
    }

    #[tokio::test]
    async fn send_with_policy_uses_table_timeout() {
        let (channel, mut modem, _events) = test_channel();
        let task = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.send_with_policy("AT+CPIN?", Some("+CPIN:")).await })
        };
        assert_eq!(read_command(&mut modem).await, "AT+CPIN?\r");
        channel.on_line("+CPIN: READY".to_string()).await;
        channel.on_line("OK".to_string()).await;
        assert_eq!(
            task.await.unwrap().unwrap().single_line(),
            Some("+CPIN: READY")
        );
    }
}
