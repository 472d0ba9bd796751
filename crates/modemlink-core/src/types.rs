//! Core types used throughout modemlink.
//!
//! These describe the readiness of the modem as a whole and of each radio
//! slot (one SIM / radio instance on a multi-SIM modem).

use std::fmt;

/// Opaque radio slot identifier.
///
/// A single-SIM modem has one slot (`SlotId::PRIMARY`); multi-SIM modems
/// expose one slot per SIM. Every per-slot table in the bridge is indexed
/// by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u8);

impl SlotId {
    /// The first (and on single-SIM devices, only) slot.
    pub const PRIMARY: SlotId = SlotId(0);

    /// Create a `SlotId` from a raw index.
    pub const fn from_index(index: u8) -> Self {
        SlotId(index)
    }

    /// Return the raw numeric index of this slot.
    pub const fn index(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}", self.0)
    }
}

/// Whether the external modem process is reachable and multiplexed.
///
/// Shared by all slots. `Offline` covers both "never came up" and "blocked,
/// asserted, or resetting".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModemState {
    /// The modem is down or has not completed its handshake.
    #[default]
    Offline,
    /// The handshake completed and channels may be opened.
    Alive,
}

impl ModemState {
    /// Encode as a byte for lock-free atomic mirrors.
    pub const fn as_u8(self) -> u8 {
        match self {
            ModemState::Offline => 0,
            ModemState::Alive => 1,
        }
    }

    /// Decode from a byte written by [`as_u8`](Self::as_u8).
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ModemState::Alive,
            _ => ModemState::Offline,
        }
    }
}

impl fmt::Display for ModemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModemState::Offline => write!(f, "offline"),
            ModemState::Alive => write!(f, "alive"),
        }
    }
}

/// Per-slot radio power state as seen by the telephony framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RadioState {
    /// Channels are down or the slot is closed.
    #[default]
    Unavailable,
    /// The radio is reachable but powered off (airplane mode).
    Off,
    /// The radio is powered on.
    On,
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RadioState::Unavailable => "unavailable",
            RadioState::Off => "off",
            RadioState::On => "on",
        };
        write!(f, "{s}")
    }
}

/// Kind of status notice received from the modem management endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModemStatusKind {
    /// The modem stopped answering.
    Blocked,
    /// The modem firmware hit a fatal assertion.
    Assert,
    /// The modem is being reset.
    Reset,
    /// The modem (re)started and is reachable.
    Alive,
}

impl ModemStatusKind {
    /// Whether this notice takes the modem offline.
    pub const fn is_fatal(self) -> bool {
        !matches!(self, ModemStatusKind::Alive)
    }
}

impl fmt::Display for ModemStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModemStatusKind::Blocked => "blocked",
            ModemStatusKind::Assert => "assert",
            ModemStatusKind::Reset => "reset",
            ModemStatusKind::Alive => "alive",
        };
        write!(f, "{s}")
    }
}

/// A classified notice from the management endpoint, with the raw text
/// kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemStatusEvent {
    /// What happened.
    pub kind: ModemStatusKind,
    /// The text exactly as received.
    pub raw: String,
}
