//! Asynchronous bridge event types.
//!
//! Events are emitted through a [`tokio::sync::broadcast`] channel when the
//! modem or a slot changes state. The telephony framework layer subscribes
//! to these instead of polling.

use crate::types::{ModemStatusEvent, RadioState, SlotId};

/// An event emitted by the bridge.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// The management endpoint reported a modem status change.
    ModemStatusChanged(ModemStatusEvent),

    /// A slot's radio state changed value.
    RadioStateChanged {
        /// Which slot changed.
        slot: SlotId,
        /// The new radio state.
        state: RadioState,
    },

    /// The SIM status of a slot may have changed and should be re-queried.
    SimStatusChanged {
        /// Which slot.
        slot: SlotId,
    },

    /// All channels of a slot are open and initialized.
    ChannelsReady {
        /// Which slot.
        slot: SlotId,
    },

    /// A line arrived that does not belong to any pending command.
    Unsolicited {
        /// Which slot it arrived on.
        slot: SlotId,
        /// Name of the channel it arrived on.
        channel: String,
        /// The line text, without terminator.
        line: String,
    },
}
