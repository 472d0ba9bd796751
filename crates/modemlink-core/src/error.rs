//! Error types for modemlink.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, AT protocol
//! failures, and readiness rejections are all captured here.

/// The error type for all modemlink operations.
///
/// Variants cover the failure modes met when talking to a multiplexed
/// modem: device/socket failures, per-channel correlation failures,
/// handshake failures, and admission rejections.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial device, management socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed line, unexpected reply).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for the final response to a command.
    ///
    /// The channel is usable again as soon as this is returned. A reply
    /// that arrives afterwards is treated as unsolicited.
    #[error("timeout waiting for response")]
    Timeout,

    /// The channel hit EOF or a fatal read/write error.
    ///
    /// The owning slot tears down its channels and reconnects; callers
    /// should treat the command as never answered.
    #[error("channel closed")]
    ChannelClosed,

    /// Another command is already outstanding on this channel.
    #[error("a command is already pending on this channel")]
    AlreadyPending,

    /// The mode-select / multiplex handshake did not complete.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The modem or radio is not ready for this request.
    #[error("radio not available")]
    NotAvailable,

    /// The request is not known to this bridge.
    #[error("request not supported")]
    NotSupported,

    /// An invalid parameter was passed to a builder or command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("device busy".into());
        assert_eq!(e.to_string(), "transport error: device busy");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_channel_closed() {
        assert_eq!(Error::ChannelClosed.to_string(), "channel closed");
    }

    #[test]
    fn error_display_already_pending() {
        assert_eq!(
            Error::AlreadyPending.to_string(),
            "a command is already pending on this channel"
        );
    }

    #[test]
    fn error_display_handshake_failed() {
        let e = Error::HandshakeFailed("AT+CMUX=0 returned ERROR".into());
        assert_eq!(e.to_string(), "handshake failed: AT+CMUX=0 returned ERROR");
    }

    #[test]
    fn error_display_not_available() {
        assert_eq!(Error::NotAvailable.to_string(), "radio not available");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
