//! Per-slot readiness state.
//!
//! Each [`Slot`] keeps its [`SlotState`] in a `watch` cell: every update is
//! made under the cell's lock and wakes every watcher, whether or not the
//! value changed. Upward [`BridgeEvent`]s are only emitted on real changes.
//!
//! The modem state is shared by all slots. [`SlotTable`] mirrors it in an
//! atomic so hot paths can read it without touching any slot lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use modemlink_at::Channel;
use modemlink_core::events::BridgeEvent;
use modemlink_core::types::{ModemState, RadioState, SlotId};

/// Snapshot of one slot's readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotState {
    pub radio: RadioState,
    pub modem: ModemState,
    /// Forces `radio` to `Unavailable` while set.
    pub closed: bool,
    /// All channels are open.
    pub channels_ready: bool,
}

/// One radio slot: its state cell, its open channels, and the handle used
/// to wake its multiplexer.
pub struct Slot {
    id: SlotId,
    state: watch::Sender<SlotState>,
    reader: Mutex<Option<CancellationToken>>,
    channels: RwLock<Vec<Arc<Channel>>>,
    event_tx: broadcast::Sender<BridgeEvent>,
}

impl Slot {
    pub fn new(id: SlotId, event_tx: broadcast::Sender<BridgeEvent>) -> Self {
        let (state, _) = watch::channel(SlotState::default());
        Slot {
            id,
            state,
            reader: Mutex::new(None),
            channels: RwLock::new(Vec::new()),
            event_tx,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn snapshot(&self) -> SlotState {
        *self.state.borrow()
    }

    /// Watch every state update of this slot.
    pub fn subscribe(&self) -> watch::Receiver<SlotState> {
        self.state.subscribe()
    }

    pub fn radio_state(&self) -> RadioState {
        self.state.borrow().radio
    }

    pub fn modem_state(&self) -> ModemState {
        self.state.borrow().modem
    }

    /// Request a radio state. Returns the state actually applied, which is
    /// `Unavailable` while the slot is closed.
    pub fn set_radio_state(&self, requested: RadioState) -> RadioState {
        let mut applied = requested;
        let mut previous = requested;
        self.state.send_modify(|s| {
            previous = s.radio;
            if s.closed {
                applied = RadioState::Unavailable;
            }
            s.radio = applied;
        });

        if previous != applied {
            info!(slot = %self.id, from = %previous, to = %applied, "radio state changed");
            let _ = self.event_tx.send(BridgeEvent::RadioStateChanged {
                slot: self.id,
                state: applied,
            });
            if applied == RadioState::On {
                debug!(slot = %self.id, "radio powered on, running post-power-on hook");
            }
        }
        applied
    }

    /// Open or close the slot. Closing forces the radio to `Unavailable`.
    pub fn set_closed(&self, closed: bool) {
        self.state.send_modify(|s| s.closed = closed);
        debug!(slot = %self.id, closed, "slot closed flag updated");
        if closed {
            self.set_radio_state(RadioState::Unavailable);
        }
    }

    /// Record whether every channel of the slot is open.
    pub fn set_channels_ready(&self, ready: bool) {
        let mut was_ready = ready;
        self.state.send_modify(|s| {
            was_ready = s.channels_ready;
            s.channels_ready = ready;
        });
        if ready && !was_ready {
            info!(slot = %self.id, "channels ready");
            let _ = self.event_tx.send(BridgeEvent::ChannelsReady { slot: self.id });
        }
    }

    /// Apply a modem state change to this slot. Going offline also makes
    /// the radio unavailable; the alive-to-offline edge additionally tells
    /// the framework to re-query the SIM.
    pub(crate) fn set_modem_state(&self, modem: ModemState) {
        let mut previous = modem;
        self.state.send_modify(|s| {
            previous = s.modem;
            s.modem = modem;
        });
        if modem == ModemState::Offline {
            self.set_radio_state(RadioState::Unavailable);
            if previous == ModemState::Alive {
                let _ = self.event_tx.send(BridgeEvent::SimStatusChanged { slot: self.id });
            }
        }
    }

    /// Wait until the modem is alive. Returns immediately if it already is.
    pub async fn wait_for_modem_alive(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|s| s.modem == ModemState::Alive).await;
    }

    /// Register the token that stops this slot's multiplexer loop.
    pub fn install_reader(&self, token: CancellationToken) {
        *self.reader.lock() = Some(token);
    }

    pub fn clear_reader(&self) {
        self.reader.lock().take();
    }

    /// Whether a multiplexer loop is registered for this slot.
    pub fn reader_running(&self) -> bool {
        self.reader.lock().is_some()
    }

    /// Stop the multiplexer loop. Returns `false` if none was running.
    pub fn wake_reader(&self) -> bool {
        match self.reader.lock().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Publish the slot's open channels.
    pub fn set_channels(&self, channels: Vec<Arc<Channel>>) {
        *self.channels.write() = channels;
    }

    /// Close and forget every channel.
    pub fn clear_channels(&self) {
        let channels = std::mem::take(&mut *self.channels.write());
        for channel in &channels {
            channel.close();
        }
    }

    /// The channel at `index` within this slot, if open.
    pub fn channel(&self, index: usize) -> Option<Arc<Channel>> {
        self.channels.read().get(index).cloned()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }
}

/// Every slot of the modem plus the shared modem state.
pub struct SlotTable {
    slots: Vec<Arc<Slot>>,
    modem: AtomicU8,
    event_tx: broadcast::Sender<BridgeEvent>,
}

impl SlotTable {
    pub fn new(count: u8, event_tx: broadcast::Sender<BridgeEvent>) -> Self {
        let slots = (0..count)
            .map(|i| Arc::new(Slot::new(SlotId::from_index(i), event_tx.clone())))
            .collect();
        SlotTable {
            slots,
            modem: AtomicU8::new(ModemState::Offline.as_u8()),
            event_tx,
        }
    }

    pub fn slot(&self, id: SlotId) -> Option<&Arc<Slot>> {
        self.slots.get(usize::from(id.index()))
    }

    pub fn slots(&self) -> &[Arc<Slot>] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lock-free read of the shared modem state.
    pub fn modem_state(&self) -> ModemState {
        ModemState::from_u8(self.modem.load(Ordering::Acquire))
    }

    /// Apply a modem state to the atomic mirror and then to every slot,
    /// each under its own lock.
    pub fn set_modem_state(&self, state: ModemState) {
        let previous = ModemState::from_u8(self.modem.swap(state.as_u8(), Ordering::AcqRel));
        if previous != state {
            info!(from = %previous, to = %state, "modem state changed");
        }
        for slot in &self.slots {
            slot.set_modem_state(state);
        }
    }

    /// The sender all slots emit on.
    pub fn events(&self) -> &broadcast::Sender<BridgeEvent> {
        &self.event_tx
    }
}
