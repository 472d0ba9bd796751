//! The running bridge.
//!
//! [`Bridge`] owns the lifecycle monitor and the per-slot supervisors
//! started by [`BridgeBuilder`](crate::BridgeBuilder). It is the surface
//! the framework-facing side talks to: readiness queries, admission,
//! command dispatch onto slot channels, and event subscription.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use modemlink_at::{Channel, Response, TimeoutPolicy};
use modemlink_core::admission::{self, Admission, RequestKind};
use modemlink_core::error::{Error, Result};
use modemlink_core::events::BridgeEvent;
use modemlink_core::types::{ModemState, RadioState, SlotId};

use crate::monitor::{MonitorHandle, Watchdog};
use crate::state::{Slot, SlotState, SlotTable};

pub struct Bridge {
    table: Arc<SlotTable>,
    event_tx: broadcast::Sender<BridgeEvent>,
    policy: Arc<TimeoutPolicy>,
    monitor: MonitorHandle,
    supervisors: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Bridge {
    pub(crate) fn new(
        table: Arc<SlotTable>,
        event_tx: broadcast::Sender<BridgeEvent>,
        policy: Arc<TimeoutPolicy>,
        monitor: MonitorHandle,
        supervisors: Vec<JoinHandle<()>>,
        shutdown: CancellationToken,
    ) -> Self {
        Bridge {
            table,
            event_tx,
            policy,
            monitor,
            supervisors,
            shutdown,
        }
    }

    /// Subscribe to bridge events.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.event_tx.subscribe()
    }

    pub fn slot_count(&self) -> usize {
        self.table.len()
    }

    pub fn modem_state(&self) -> ModemState {
        self.table.modem_state()
    }

    pub fn radio_state(&self, slot: SlotId) -> Result<RadioState> {
        Ok(self.slot(slot)?.radio_state())
    }

    pub fn slot_state(&self, slot: SlotId) -> Result<SlotState> {
        Ok(self.slot(slot)?.snapshot())
    }

    /// Watch every state update of `slot`.
    pub fn watch_slot(&self, slot: SlotId) -> Result<watch::Receiver<SlotState>> {
        Ok(self.slot(slot)?.subscribe())
    }

    /// The command timeout table in use.
    pub fn timeout_policy(&self) -> &TimeoutPolicy {
        &self.policy
    }

    /// Decide whether `request` may be dispatched on `slot` right now.
    pub fn admit(&self, slot: SlotId, request: RequestKind) -> Result<Admission> {
        let radio = self.slot(slot)?.radio_state();
        let decision = admission::admit(radio, self.table.modem_state(), request);
        if let Admission::Reject(reason) = decision {
            debug!(slot = %slot, request = %request, ?reason, "request rejected");
        }
        Ok(decision)
    }

    /// [`admit`](Self::admit) for a raw framework request code.
    pub fn admit_code(&self, slot: SlotId, code: u32) -> Result<Admission> {
        self.admit(slot, RequestKind::from_code(code))
    }

    /// Send `command` on one of `slot`'s channels, with the timeout taken
    /// from the policy table.
    pub async fn send(
        &self,
        slot: SlotId,
        channel: usize,
        command: &str,
        response_prefix: Option<&str>,
    ) -> Result<Response> {
        self.ready_channel(slot, channel)?
            .send_with_policy(command, response_prefix)
            .await
    }

    /// Send `command` with an explicit timeout.
    pub async fn send_with_timeout(
        &self,
        slot: SlotId,
        channel: usize,
        command: &str,
        response_prefix: Option<&str>,
        timeout: Duration,
    ) -> Result<Response> {
        self.ready_channel(slot, channel)?
            .send(command, response_prefix, timeout)
            .await
    }

    /// Send a prompt-driven command and type `pdu` at the `"> "` prompt.
    pub async fn send_with_pdu(
        &self,
        slot: SlotId,
        channel: usize,
        command: &str,
        pdu: &str,
        response_prefix: Option<&str>,
    ) -> Result<Response> {
        let timeout = self.policy.lookup(command);
        self.ready_channel(slot, channel)?
            .send_with_pdu(command, pdu, response_prefix, timeout)
            .await
    }

    /// Request a radio state for `slot`. Returns the state applied.
    pub fn set_radio_state(&self, slot: SlotId, state: RadioState) -> Result<RadioState> {
        Ok(self.slot(slot)?.set_radio_state(state))
    }

    /// Open or close `slot`. A closed slot reports its radio unavailable.
    pub fn set_closed(&self, slot: SlotId, closed: bool) -> Result<()> {
        self.slot(slot)?.set_closed(closed);
        Ok(())
    }

    /// Report an unresponsive modem to the lifecycle monitor.
    pub fn watchdog(&self) -> Watchdog {
        self.monitor.watchdog()
    }

    /// Stop the monitor and every slot supervisor, releasing all devices.
    pub async fn shutdown(self) {
        info!("bridge shutting down");
        self.shutdown.cancel();
        for task in self.supervisors {
            let _ = task.await;
        }
        self.monitor.shutdown().await;
    }

    fn slot(&self, id: SlotId) -> Result<&Arc<Slot>> {
        self.table
            .slot(id)
            .ok_or_else(|| Error::InvalidParameter(format!("no slot {id}")))
    }

    fn ready_channel(&self, slot: SlotId, index: usize) -> Result<Arc<Channel>> {
        let slot = self.slot(slot)?;
        let state = slot.snapshot();
        if self.table.modem_state() != ModemState::Alive || !state.channels_ready {
            return Err(Error::NotAvailable);
        }
        slot.channel(index).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "slot {} has {} channels, asked for {index}",
                slot.id(),
                slot.channel_count()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeBuilder;
    use modemlink_core::admission::RejectReason;
    use modemlink_core::types::ModemStatusKind;
    use modemlink_test_harness::{MockDevices, MockManagement, MockTransport};

    struct Fixture {
        bridge: Bridge,
        devices: MockDevices,
        management: MockManagement,
        events: broadcast::Receiver<BridgeEvent>,
    }

    fn raw_modem() -> MockTransport {
        let mut raw = MockTransport::new();
        raw.expect(b"AT+SIMMODE=0\r", b"\r\nOK\r\n");
        raw.expect(b"AT+CMUX=0\r", b"\r\nOK\r\n");
        raw
    }

    async fn start() -> Fixture {
        let devices = MockDevices::new();
        let management = MockManagement::new();
        let bridge = BridgeBuilder::new()
            .base_path("/dev/mux")
            .channels_per_slot(2)
            .zero_read_policy(0, Duration::ZERO)
            .devices(Arc::new(devices.clone()))
            .connector(Arc::new(management.clone()))
            .build()
            .unwrap();
        let events = bridge.subscribe();
        management.wait_for_connects(1).await;
        Fixture {
            bridge,
            devices,
            management,
            events,
        }
    }

    async fn next_matching(
        events: &mut broadcast::Receiver<BridgeEvent>,
        pred: impl Fn(&BridgeEvent) -> bool,
    ) -> BridgeEvent {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let event = events.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    /// Bring the modem alive and wait until post-alive init has finished.
    async fn bring_alive(fx: &mut Fixture) {
        fx.devices.push_raw(raw_modem());
        assert!(fx.management.notify("Modem Alive\n"));
        next_matching(&mut fx.events, |e| {
            matches!(
                e,
                BridgeEvent::RadioStateChanged {
                    state: RadioState::Off,
                    ..
                }
            )
        })
        .await;
    }

    #[tokio::test]
    async fn starts_offline_and_rejects_sends() {
        let fx = start().await;
        assert_eq!(fx.bridge.modem_state(), ModemState::Offline);
        assert_eq!(
            fx.bridge.radio_state(SlotId::PRIMARY).unwrap(),
            RadioState::Unavailable
        );
        let result = fx.bridge.send(SlotId::PRIMARY, 0, "AT", None).await;
        assert!(matches!(result, Err(Error::NotAvailable)));
        assert_eq!(
            fx.bridge.admit(SlotId::PRIMARY, RequestKind::GetImei).unwrap(),
            Admission::Reject(RejectReason::NotAvailable)
        );
        fx.bridge.shutdown().await;
    }

    #[tokio::test]
    async fn alive_notice_brings_channels_up_and_commands_flow() {
        let mut fx = start().await;
        bring_alive(&mut fx).await;

        assert_eq!(fx.bridge.modem_state(), ModemState::Alive);
        let state = fx.bridge.slot_state(SlotId::PRIMARY).unwrap();
        assert!(state.channels_ready);
        assert_eq!(state.radio, RadioState::Off);
        assert_eq!(fx.devices.channel_opens(), vec!["/dev/mux0", "/dev/mux1"]);
        assert_eq!(
            fx.devices.commands_on("/dev/mux0"),
            vec!["ATE0Q0V1", "AT+CMEE=1"]
        );

        fx.devices.reply("AT+CSQ", "\r\n+CSQ: 20,99\r\n\r\nOK\r\n");
        let response = fx
            .bridge
            .send(SlotId::PRIMARY, 1, "AT+CSQ", Some("+CSQ:"))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.single_line(), Some("+CSQ: 20,99"));

        fx.bridge.shutdown().await;
    }

    #[tokio::test]
    async fn admission_follows_radio_state() {
        let mut fx = start().await;
        bring_alive(&mut fx).await;
        let slot = SlotId::PRIMARY;

        assert_eq!(
            fx.bridge.admit(slot, RequestKind::RadioPower).unwrap(),
            Admission::Admit
        );
        assert_eq!(
            fx.bridge.admit(slot, RequestKind::Dial).unwrap(),
            Admission::Reject(RejectReason::NotAvailable)
        );

        fx.bridge.set_radio_state(slot, RadioState::On).unwrap();
        assert_eq!(fx.bridge.admit(slot, RequestKind::Dial).unwrap(), Admission::Admit);
        assert_eq!(
            fx.bridge.admit_code(slot, 9999).unwrap(),
            Admission::Reject(RejectReason::NotSupported)
        );

        fx.bridge.shutdown().await;
    }

    #[tokio::test]
    async fn closed_slot_reports_unavailable() {
        let mut fx = start().await;
        bring_alive(&mut fx).await;
        let slot = SlotId::PRIMARY;

        fx.bridge.set_closed(slot, true).unwrap();
        assert_eq!(
            fx.bridge.set_radio_state(slot, RadioState::On).unwrap(),
            RadioState::Unavailable
        );
        fx.bridge.set_closed(slot, false).unwrap();
        assert_eq!(
            fx.bridge.set_radio_state(slot, RadioState::On).unwrap(),
            RadioState::On
        );

        fx.bridge.shutdown().await;
    }

    #[tokio::test]
    async fn reset_notice_takes_the_bridge_offline() {
        let mut fx = start().await;
        bring_alive(&mut fx).await;

        assert!(fx.management.notify("Modem Reset\n"));
        let event = next_matching(&mut fx.events, |e| {
            matches!(e, BridgeEvent::ModemStatusChanged(_))
        })
        .await;
        match event {
            BridgeEvent::ModemStatusChanged(status) => {
                assert_eq!(status.kind, ModemStatusKind::Reset)
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(fx.bridge.modem_state(), ModemState::Offline);
        assert_eq!(
            fx.bridge.radio_state(SlotId::PRIMARY).unwrap(),
            RadioState::Unavailable
        );
        let result = fx.bridge.send(SlotId::PRIMARY, 0, "AT", None).await;
        assert!(matches!(result, Err(Error::NotAvailable)));

        fx.bridge.shutdown().await;
    }

    #[tokio::test]
    async fn bad_slot_and_channel_are_invalid() {
        let mut fx = start().await;
        bring_alive(&mut fx).await;

        let missing = SlotId::from_index(5);
        assert!(matches!(
            fx.bridge.radio_state(missing),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            fx.bridge.send(SlotId::PRIMARY, 7, "AT", None).await,
            Err(Error::InvalidParameter(_))
        ));

        fx.bridge.shutdown().await;
    }
}
