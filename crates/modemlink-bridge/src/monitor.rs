//! Modem lifecycle supervision.
//!
//! One long-lived task watches two sources at once:
//!
//! - the modem management endpoint, which reports `Modem Alive`,
//!   `Modem Reset` and friends as plain text, and
//! - the internal [`Watchdog`], which any component pokes when the modem
//!   looks unresponsive from the inside (a channel died under it).
//!
//! Fatal notices take every slot offline and stop their multiplexers. An
//! alive notice while offline runs the handshake and, if it succeeds,
//! brings every slot back to alive so the supervisors reopen channels.
//! The handshake is driven from the same loop, so notices, watchdog pokes
//! and shutdown are still served while it waits on a silent modem; a fatal
//! notice abandons it.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use modemlink_core::events::BridgeEvent;
use modemlink_core::transport::{ManagementConnector, Transport};
use modemlink_core::types::{ModemState, ModemStatusEvent, ModemStatusKind};

use crate::handshake::ModemHandshake;
use crate::state::SlotTable;

/// Notice written to the management endpoint when the watchdog fires.
pub const BLOCKED_NOTICE: &str = "Modem Blocked\n";

/// An assert notice containing this is diagnostic log chatter, not a crash.
pub const DIAG_ASSERT_MARKER: &str = "Modem Assert: Diag Log";

/// How long one management receive waits before re-arming.
const IDLE_RECEIVE: Duration = Duration::from_secs(60);

/// Classify one management notice.
///
/// Exactly one kind is chosen, checked in the order blocked, assert, reset,
/// alive. Anything else is `None`.
pub fn parse_notice(text: &str) -> Option<ModemStatusKind> {
    if text.contains("Modem Blocked") {
        Some(ModemStatusKind::Blocked)
    } else if text.contains("Modem Assert") && !text.contains(DIAG_ASSERT_MARKER) {
        Some(ModemStatusKind::Assert)
    } else if text.contains("Modem Reset") {
        Some(ModemStatusKind::Reset)
    } else if text.contains("Modem Alive") {
        Some(ModemStatusKind::Alive)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

/// Cloneable, non-blocking "the modem looks stuck" signal.
#[derive(Debug, Clone)]
pub struct Watchdog {
    tx: mpsc::Sender<()>,
}

impl Watchdog {
    /// A watchdog and the receiving end the monitor waits on.
    pub(crate) fn channel(capacity: usize) -> (Watchdog, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Watchdog { tx }, rx)
    }

    /// Poke the monitor. Never blocks; pokes coalesce while one is queued.
    pub fn poke(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("watchdog poked after monitor exit");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Lifecycle monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pause between management connection attempts.
    pub reconnect_interval: Duration,
    /// Queued watchdog pokes before further pokes coalesce.
    pub watchdog_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(2),
            watchdog_capacity: 8,
        }
    }
}

/// What woke the monitor loop.
enum Wake {
    Watchdog,
    Management(modemlink_core::Result<usize>),
    Reconnect,
    Handshake(modemlink_core::Result<()>),
}

/// Outcome of applying one management notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NoticeAction {
    /// Nothing to do.
    Ignored,
    /// The modem went offline.
    Fatal,
    /// The modem came alive while offline; a handshake must run.
    Handshake,
}

/// A handshake running alongside the monitor loop.
struct InFlight {
    future: BoxFuture<'static, modemlink_core::Result<()>>,
    /// The alive notice that started it.
    raw: String,
}

/// The lifecycle monitor, before it is spawned.
pub struct LifecycleMonitor {
    table: Arc<SlotTable>,
    connector: Arc<dyn ManagementConnector>,
    handshake: Arc<dyn ModemHandshake>,
    event_tx: broadcast::Sender<BridgeEvent>,
    config: MonitorConfig,
    watchdog: Watchdog,
    watchdog_rx: mpsc::Receiver<()>,
}

/// Handle to a running [`LifecycleMonitor`].
pub struct MonitorHandle {
    watchdog: Watchdog,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// A watchdog handle feeding the running monitor.
    pub fn watchdog(&self) -> Watchdog {
        self.watchdog.clone()
    }

    /// Stop the monitor task and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

impl LifecycleMonitor {
    /// A monitor driving `table` from the endpoint behind `connector`,
    /// running `handshake` on every offline-to-alive transition.
    pub fn new(
        table: Arc<SlotTable>,
        connector: Arc<dyn ManagementConnector>,
        handshake: Arc<dyn ModemHandshake>,
        config: MonitorConfig,
    ) -> Self {
        let (watchdog, watchdog_rx) = Watchdog::channel(config.watchdog_capacity);
        LifecycleMonitor {
            event_tx: table.events().clone(),
            table,
            connector,
            handshake,
            config,
            watchdog,
            watchdog_rx,
        }
    }

    /// A watchdog handle, available before the monitor is spawned.
    pub fn watchdog(&self) -> Watchdog {
        self.watchdog.clone()
    }

    /// Spawn the monitor task.
    pub fn spawn(self) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let watchdog = self.watchdog.clone();
        let task = tokio::spawn(self.run(cancel.clone()));
        MonitorHandle {
            watchdog,
            cancel,
            task,
        }
    }

    async fn run(mut self, cancel: CancellationToken) {
        let mut link: Option<Box<dyn Transport>> = None;
        let mut handshake: Option<InFlight> = None;
        let mut buf = vec![0u8; 1024];
        let mut connect_now = true;

        info!("lifecycle monitor started");
        loop {
            if link.is_none() && connect_now {
                match self.connector.connect().await {
                    Ok(transport) => {
                        info!("connected to modem management endpoint");
                        link = Some(transport);
                    }
                    Err(e) => debug!(error = %e, "management endpoint unavailable"),
                }
                connect_now = false;
            }

            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.watchdog_rx.recv() => Wake::Watchdog,
                wake = incoming(link.as_mut(), &mut buf, self.config.reconnect_interval) => wake,
                result = in_flight(&mut handshake) => Wake::Handshake(result),
            };

            match wake {
                Wake::Watchdog => {
                    while self.watchdog_rx.try_recv().is_ok() {}
                    match link.as_mut() {
                        Some(transport) => {
                            warn!("watchdog fired, reporting modem blocked");
                            if let Err(e) = transport.send(BLOCKED_NOTICE.as_bytes()).await {
                                warn!(error = %e, "failed to report blocked modem");
                                drop_link(&mut link).await;
                                connect_now = true;
                            }
                        }
                        None => {
                            debug!("watchdog fired while disconnected, reconnecting");
                            connect_now = true;
                        }
                    }
                }
                Wake::Reconnect => connect_now = true,
                Wake::Handshake(result) => {
                    if let Some(done) = handshake.take() {
                        self.finish_handshake(result, &done.raw);
                    }
                }
                Wake::Management(Err(modemlink_core::Error::Timeout)) => {}
                Wake::Management(Ok(0)) => {
                    warn!("management endpoint closed the connection");
                    drop_link(&mut link).await;
                }
                Wake::Management(Err(e)) => {
                    warn!(error = %e, "management connection failed");
                    drop_link(&mut link).await;
                }
                Wake::Management(Ok(n)) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    for notice in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                        match self.apply_notice(notice, handshake.is_some()) {
                            NoticeAction::Ignored => {}
                            NoticeAction::Fatal => {
                                if handshake.take().is_some() {
                                    warn!("abandoning handshake in progress");
                                }
                            }
                            NoticeAction::Handshake => {
                                info!("modem alive, starting handshake");
                                let runner = Arc::clone(&self.handshake);
                                handshake = Some(InFlight {
                                    future: Box::pin(async move { runner.run().await }),
                                    raw: notice.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }

        if handshake.is_some() {
            debug!("dropping handshake in progress");
        }
        drop_link(&mut link).await;
        info!("lifecycle monitor stopped");
    }

    /// Act on one line of management text. `handshaking` is whether a
    /// handshake is already running.
    pub(crate) fn apply_notice(&self, text: &str, handshaking: bool) -> NoticeAction {
        let Some(kind) = parse_notice(text) else {
            debug!(text, "ignoring unrecognized management notice");
            return NoticeAction::Ignored;
        };

        if kind.is_fatal() {
            warn!(%kind, text, "modem went offline");
            self.table.set_modem_state(ModemState::Offline);
            for slot in self.table.slots() {
                if kind == ModemStatusKind::Reset && !slot.reader_running() {
                    debug!(slot = %slot.id(), "reader already stopped, skipping");
                    continue;
                }
                slot.wake_reader();
            }
            self.emit(kind, text);
            return NoticeAction::Fatal;
        }

        if self.table.modem_state() == ModemState::Alive {
            debug!("modem already alive, ignoring");
            return NoticeAction::Ignored;
        }
        if handshaking {
            debug!("handshake already running, ignoring");
            return NoticeAction::Ignored;
        }
        NoticeAction::Handshake
    }

    /// Apply the outcome of a handshake started by the alive notice `raw`.
    pub(crate) fn finish_handshake(&self, result: modemlink_core::Result<()>, raw: &str) {
        match result {
            Ok(()) => {
                self.table.set_modem_state(ModemState::Alive);
                self.emit(ModemStatusKind::Alive, raw);
            }
            Err(e) => error!(error = %e, "handshake failed, modem stays offline"),
        }
    }

    fn emit(&self, kind: ModemStatusKind, raw: &str) {
        let _ = self
            .event_tx
            .send(BridgeEvent::ModemStatusChanged(ModemStatusEvent {
                kind,
                raw: raw.to_string(),
            }));
    }
}

/// Wait for management input, or for the reconnect interval when there is
/// no link.
async fn incoming(
    link: Option<&mut Box<dyn Transport>>,
    buf: &mut [u8],
    reconnect_interval: Duration,
) -> Wake {
    match link {
        Some(transport) => Wake::Management(transport.receive(buf, IDLE_RECEIVE).await),
        None => {
            tokio::time::sleep(reconnect_interval).await;
            Wake::Reconnect
        }
    }
}

/// Drive the running handshake, if any. Pends forever when idle.
async fn in_flight(handshake: &mut Option<InFlight>) -> modemlink_core::Result<()> {
    match handshake {
        Some(running) => running.future.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn drop_link(link: &mut Option<Box<dyn Transport>>) {
    if let Some(mut transport) = link.take() {
        let _ = transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use modemlink_core::Result;
    use modemlink_core::types::RadioState;
    use crate::handshake::{HandshakeConfig, MuxHandshake};
    use modemlink_test_harness::{MockDevices, MockManagement, MockTransport};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Handshake double with a scripted outcome.
    #[derive(Default)]
    struct FakeHandshake {
        runs: AtomicUsize,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl ModemHandshake for FakeHandshake {
        async fn run(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock() {
                Err(modemlink_core::Error::HandshakeFailed("scripted".into()))
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        table: Arc<SlotTable>,
        handshake: Arc<FakeHandshake>,
        mgmt: MockManagement,
        events: broadcast::Receiver<BridgeEvent>,
    }

    fn fixture(slots: u8) -> (Fixture, LifecycleMonitor) {
        let (event_tx, events) = broadcast::channel(64);
        let table = Arc::new(SlotTable::new(slots, event_tx));
        let handshake = Arc::new(FakeHandshake::default());
        let mgmt = MockManagement::new();
        let monitor = LifecycleMonitor::new(
            Arc::clone(&table),
            Arc::new(mgmt.clone()),
            handshake.clone(),
            MonitorConfig::default(),
        );
        (
            Fixture {
                table,
                handshake,
                mgmt,
                events,
            },
            monitor,
        )
    }

    /// Apply `text` as the run loop would, running any handshake to
    /// completion.
    async fn deliver(monitor: &LifecycleMonitor, text: &str) {
        if monitor.apply_notice(text, false) == NoticeAction::Handshake {
            let result = monitor.handshake.run().await;
            monitor.finish_handshake(result, text);
        }
    }

    fn status_events(rx: &mut broadcast::Receiver<BridgeEvent>) -> Vec<ModemStatusKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BridgeEvent::ModemStatusChanged(status) = event {
                kinds.push(status.kind);
            }
        }
        kinds
    }

    #[test]
    fn notice_parsing() {
        assert_eq!(parse_notice("Modem Blocked"), Some(ModemStatusKind::Blocked));
        assert_eq!(parse_notice("Modem Assert: mm.c:120"), Some(ModemStatusKind::Assert));
        assert_eq!(parse_notice("Modem Assert: Diag Log saved"), None);
        assert_eq!(parse_notice("Modem Reset"), Some(ModemStatusKind::Reset));
        assert_eq!(parse_notice("Modem Alive"), Some(ModemStatusKind::Alive));
        assert_eq!(parse_notice("Modem Sleeping"), None);
        assert_eq!(parse_notice(""), None);
    }

    #[tokio::test]
    async fn alive_runs_handshake_and_brings_slots_alive() {
        let (mut fx, monitor) = fixture(2);
        deliver(&monitor, "Modem Alive").await;

        assert_eq!(fx.handshake.runs.load(Ordering::SeqCst), 1);
        assert_eq!(fx.table.modem_state(), ModemState::Alive);
        for slot in fx.table.slots() {
            assert_eq!(slot.modem_state(), ModemState::Alive);
        }
        assert_eq!(status_events(&mut fx.events), vec![ModemStatusKind::Alive]);

        // A second alive notice is ignored.
        deliver(&monitor, "Modem Alive").await;
        assert_eq!(fx.handshake.runs.load(Ordering::SeqCst), 1);
        assert!(status_events(&mut fx.events).is_empty());
    }

    #[tokio::test]
    async fn failed_handshake_stays_offline() {
        let (mut fx, monitor) = fixture(1);
        *fx.handshake.fail.lock() = true;

        deliver(&monitor, "Modem Alive").await;
        assert_eq!(fx.table.modem_state(), ModemState::Offline);
        assert!(status_events(&mut fx.events).is_empty());

        *fx.handshake.fail.lock() = false;
        deliver(&monitor, "Modem Alive").await;
        assert_eq!(fx.table.modem_state(), ModemState::Alive);
        assert_eq!(fx.handshake.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_notice_takes_slots_offline_and_wakes_readers() {
        let (mut fx, monitor) = fixture(2);
        deliver(&monitor, "Modem Alive").await;
        fx.table.slots()[0].set_radio_state(RadioState::On);
        let tokens: Vec<CancellationToken> = fx
            .table
            .slots()
            .iter()
            .map(|slot| {
                let token = CancellationToken::new();
                slot.install_reader(token.clone());
                token
            })
            .collect();
        status_events(&mut fx.events);

        deliver(&monitor, "Modem Assert: l1_main.c:77").await;

        assert_eq!(fx.table.modem_state(), ModemState::Offline);
        assert!(tokens.iter().all(CancellationToken::is_cancelled));
        assert_eq!(fx.table.slots()[0].radio_state(), RadioState::Unavailable);
        assert_eq!(status_events(&mut fx.events), vec![ModemStatusKind::Assert]);
    }

    #[tokio::test]
    async fn reset_skips_stopped_readers() {
        let (mut fx, monitor) = fixture(2);
        deliver(&monitor, "Modem Alive").await;
        let running = CancellationToken::new();
        fx.table.slots()[1].install_reader(running.clone());
        status_events(&mut fx.events);

        deliver(&monitor, "Modem Reset").await;
        assert!(running.is_cancelled());
        assert!(!fx.table.slots()[0].reader_running());
        assert_eq!(fx.table.modem_state(), ModemState::Offline);
        assert_eq!(status_events(&mut fx.events), vec![ModemStatusKind::Reset]);
    }

    #[tokio::test]
    async fn unrecognized_and_diag_notices_are_ignored() {
        let (mut fx, monitor) = fixture(1);
        deliver(&monitor, "Modem Alive").await;
        status_events(&mut fx.events);

        deliver(&monitor, "Modem Assert: Diag Log dumped").await;
        deliver(&monitor, "hello").await;
        assert_eq!(fx.table.modem_state(), ModemState::Alive);
        assert!(status_events(&mut fx.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn task_reacts_to_management_notices() {
        let (mut fx, monitor) = fixture(1);
        let handle = monitor.spawn();

        fx.mgmt.wait_for_connects(1).await;
        assert!(fx.mgmt.notify("Modem Alive\n"));
        let event = fx.events.recv().await.unwrap();
        assert!(matches!(
            event,
            BridgeEvent::ModemStatusChanged(ModemStatusEvent { kind: ModemStatusKind::Alive, .. })
        ));
        assert_eq!(fx.table.modem_state(), ModemState::Alive);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_forwards_blocked_notice() {
        let (fx, monitor) = fixture(1);
        let watchdog = monitor.watchdog();
        let handle = monitor.spawn();
        fx.mgmt.wait_for_connects(1).await;

        watchdog.poke();
        watchdog.poke();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(fx.mgmt.sent(), vec![BLOCKED_NOTICE.to_string()]);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_endpoint_loss() {
        let (fx, monitor) = fixture(1);
        fx.mgmt.set_available(false);
        let handle = monitor.spawn();

        // Unavailable: retried every reconnect interval.
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(fx.mgmt.attempts(), 3);
        assert_eq!(fx.mgmt.connects(), 0);

        fx.mgmt.set_available(true);
        fx.mgmt.wait_for_connects(1).await;

        fx.mgmt.disconnect();
        fx.mgmt.wait_for_connects(2).await;
        assert_eq!(fx.mgmt.connects(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_while_disconnected_forces_reconnect() {
        let (fx, monitor) = fixture(1);
        fx.mgmt.set_available(false);
        let watchdog = monitor.watchdog();
        let handle = monitor.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.mgmt.attempts(), 1);

        fx.mgmt.set_available(true);
        watchdog.poke();
        fx.mgmt.wait_for_connects(1).await;
        assert_eq!(fx.mgmt.attempts(), 2);
        assert!(fx.mgmt.sent().is_empty());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn alive_during_handshake_is_ignored() {
        let (fx, monitor) = fixture(1);
        assert_eq!(monitor.apply_notice("Modem Alive", true), NoticeAction::Ignored);
        assert_eq!(monitor.apply_notice("Modem Alive", false), NoticeAction::Handshake);
        assert_eq!(fx.handshake.runs.load(Ordering::SeqCst), 0);
    }

    /// A monitor whose handshake runs over `devices` with the default,
    /// unbounded per-command wait.
    fn silent_modem_monitor(
        devices: &MockDevices,
    ) -> (Arc<SlotTable>, MockManagement, broadcast::Receiver<BridgeEvent>, LifecycleMonitor) {
        let (event_tx, events) = broadcast::channel(64);
        let table = Arc::new(SlotTable::new(1, event_tx));
        let mgmt = MockManagement::new();
        let handshake = MuxHandshake::new(Arc::new(devices.clone()), HandshakeConfig::default());
        let monitor = LifecycleMonitor::new(
            Arc::clone(&table),
            Arc::new(mgmt.clone()),
            Arc::new(handshake),
            MonitorConfig::default(),
        );
        (table, mgmt, events, monitor)
    }

    fn silent_raw(devices: &MockDevices) -> modemlink_test_harness::MockProbe {
        let mut raw = MockTransport::new();
        raw.expect_replies(b"AT+SIMMODE=0\r", Vec::new());
        let probe = raw.probe();
        devices.push_raw(raw);
        probe
    }

    async fn next_status(events: &mut broadcast::Receiver<BridgeEvent>) -> ModemStatusKind {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let BridgeEvent::ModemStatusChanged(status) = events.recv().await.unwrap() {
                    return status.kind;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn reset_during_silent_handshake_is_handled() {
        let devices = MockDevices::new();
        let probe = silent_raw(&devices);
        let (table, mgmt, mut events, monitor) = silent_modem_monitor(&devices);
        let handle = monitor.spawn();
        mgmt.wait_for_connects(1).await;

        assert!(mgmt.notify("Modem Alive\n"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(probe.sent_text(), vec!["AT+SIMMODE=0\r"]);
        assert_eq!(table.modem_state(), ModemState::Offline);

        assert!(mgmt.notify("Modem Reset\n"));
        assert_eq!(next_status(&mut events).await, ModemStatusKind::Reset);
        assert_eq!(table.modem_state(), ModemState::Offline);

        // The abandoned handshake is not retried; the next alive notice
        // starts a fresh one on a newly opened raw device.
        let mut raw = MockTransport::new();
        raw.expect(b"AT+SIMMODE=0\r", b"\r\nOK\r\n");
        raw.expect(b"AT+CMUX=0\r", b"\r\nOK\r\n");
        devices.push_raw(raw);
        assert!(mgmt.notify("Modem Alive\n"));
        assert_eq!(next_status(&mut events).await, ModemStatusKind::Alive);
        assert_eq!(table.modem_state(), ModemState::Alive);
        assert_eq!(devices.raw_opens().len(), 2);

        tokio::time::timeout(Duration::from_secs(30), handle.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_during_silent_handshake() {
        let devices = MockDevices::new();
        let probe = silent_raw(&devices);
        let (table, mgmt, _events, monitor) = silent_modem_monitor(&devices);
        let watchdog = monitor.watchdog();
        let handle = monitor.spawn();
        mgmt.wait_for_connects(1).await;

        assert!(mgmt.notify("Modem Alive\n"));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(probe.sent_data().len(), 1);

        // Watchdog pokes are still served while the handshake waits.
        watchdog.poke();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mgmt.sent(), vec![BLOCKED_NOTICE.to_string()]);

        tokio::time::timeout(Duration::from_secs(30), handle.shutdown())
            .await
            .unwrap();
        assert_eq!(table.modem_state(), ModemState::Offline);
    }
}
