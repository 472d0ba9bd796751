//! Request admission policy.
//!
//! [`admit`] decides, from the current modem and radio readiness alone,
//! whether a framework request may be dispatched to its feature handler.
//! It holds no state and takes no locks; callers pass a (possibly slightly
//! stale) snapshot. A stale read can only cause one extra rejection.

use std::fmt;

use crate::types::{ModemState, RadioState};

/// Framework request identifiers the bridge treats specially.
///
/// Codes follow the telephony framework's request numbering. Requests that
/// need no special gating are carried as [`RequestKind::Other`]; codes
/// outside the known range are [`RequestKind::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    GetSimStatus,
    EnterSimPin,
    EnterSimPuk,
    EnterSimPin2,
    EnterSimPuk2,
    ChangeSimPin,
    ChangeSimPin2,
    GetCurrentCalls,
    Dial,
    GetImsi,
    SignalStrength,
    VoiceRegistrationState,
    Operator,
    RadioPower,
    SendSms,
    SetupDataCall,
    SimIo,
    GetImei,
    GetImeisv,
    QueryFacilityLock,
    SetFacilityLock,
    BasebandVersion,
    ScreenState,
    DeviceIdentity,
    SimOpenChannel,
    SimCloseChannel,
    SimTransmitApduChannel,
    Shutdown,
    GetRadioCapability,
    /// A known request with no readiness exemption.
    Other(u32),
    /// A code this bridge does not recognise.
    Unknown(u32),
}

/// Highest request code the framework defines.
const MAX_KNOWN_REQUEST: u32 = 140;

impl RequestKind {
    /// Map a framework request code onto a [`RequestKind`].
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => RequestKind::GetSimStatus,
            2 => RequestKind::EnterSimPin,
            3 => RequestKind::EnterSimPuk,
            4 => RequestKind::EnterSimPin2,
            5 => RequestKind::EnterSimPuk2,
            6 => RequestKind::ChangeSimPin,
            7 => RequestKind::ChangeSimPin2,
            9 => RequestKind::GetCurrentCalls,
            10 => RequestKind::Dial,
            11 => RequestKind::GetImsi,
            19 => RequestKind::SignalStrength,
            20 => RequestKind::VoiceRegistrationState,
            22 => RequestKind::Operator,
            23 => RequestKind::RadioPower,
            25 => RequestKind::SendSms,
            27 => RequestKind::SetupDataCall,
            28 => RequestKind::SimIo,
            38 => RequestKind::GetImei,
            39 => RequestKind::GetImeisv,
            42 => RequestKind::QueryFacilityLock,
            43 => RequestKind::SetFacilityLock,
            51 => RequestKind::BasebandVersion,
            61 => RequestKind::ScreenState,
            98 => RequestKind::DeviceIdentity,
            115 => RequestKind::SimOpenChannel,
            116 => RequestKind::SimCloseChannel,
            117 => RequestKind::SimTransmitApduChannel,
            129 => RequestKind::Shutdown,
            130 => RequestKind::GetRadioCapability,
            1..=MAX_KNOWN_REQUEST => RequestKind::Other(code),
            _ => RequestKind::Unknown(code),
        }
    }

    /// Requests allowed while the radio is [`RadioState::Unavailable`]:
    /// identity, capability, SIM logical-channel, and shutdown requests.
    fn allowed_when_unavailable(self) -> bool {
        matches!(
            self,
            RequestKind::GetImei
                | RequestKind::GetImeisv
                | RequestKind::DeviceIdentity
                | RequestKind::BasebandVersion
                | RequestKind::GetRadioCapability
                | RequestKind::SimOpenChannel
                | RequestKind::SimCloseChannel
                | RequestKind::SimTransmitApduChannel
                | RequestKind::Shutdown
        )
    }

    /// Requests allowed while the radio is [`RadioState::Off`]: power
    /// control, PIN and SIM operations, status queries, and shutdown.
    fn allowed_when_off(self) -> bool {
        self.allowed_when_unavailable()
            || matches!(
                self,
                RequestKind::RadioPower
                    | RequestKind::GetSimStatus
                    | RequestKind::EnterSimPin
                    | RequestKind::EnterSimPuk
                    | RequestKind::EnterSimPin2
                    | RequestKind::EnterSimPuk2
                    | RequestKind::ChangeSimPin
                    | RequestKind::ChangeSimPin2
                    | RequestKind::GetImsi
                    | RequestKind::SimIo
                    | RequestKind::QueryFacilityLock
                    | RequestKind::SetFacilityLock
                    | RequestKind::GetCurrentCalls
                    | RequestKind::VoiceRegistrationState
                    | RequestKind::Operator
                    | RequestKind::ScreenState
            )
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Other(code) => write!(f, "request#{code}"),
            RequestKind::Unknown(code) => write!(f, "unknown#{code}"),
            named => write!(f, "{named:?}"),
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The modem or radio is not in a state that can serve it.
    NotAvailable,
    /// The bridge does not know this request.
    NotSupported,
}

/// Outcome of [`admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Dispatch the request to its feature handler.
    Admit,
    /// Reply to the framework with an error immediately.
    Reject(RejectReason),
}

impl Admission {
    /// Convert into a `Result`, mapping rejections onto the crate error.
    pub fn into_result(self) -> crate::error::Result<()> {
        match self {
            Admission::Admit => Ok(()),
            Admission::Reject(RejectReason::NotAvailable) => Err(crate::Error::NotAvailable),
            Admission::Reject(RejectReason::NotSupported) => Err(crate::Error::NotSupported),
        }
    }
}

/// Decide whether `request` may proceed given current readiness.
pub fn admit(radio: RadioState, modem: ModemState, request: RequestKind) -> Admission {
    if modem != ModemState::Alive {
        return Admission::Reject(RejectReason::NotAvailable);
    }

    match radio {
        RadioState::Unavailable if !request.allowed_when_unavailable() => {
            Admission::Reject(RejectReason::NotAvailable)
        }
        RadioState::Off if !request.allowed_when_off() => {
            Admission::Reject(RejectReason::NotAvailable)
        }
        _ => match request {
            RequestKind::Unknown(_) => Admission::Reject(RejectReason::NotSupported),
            _ => Admission::Admit,
        },
    }
}
