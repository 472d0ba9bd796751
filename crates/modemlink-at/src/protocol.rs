//! Shared AT protocol tokens and response line classification.
//!
//! A line coming off a channel is one of four things: the end of a
//! successful reply, the end of a failed reply, a data line belonging to the
//! command in flight, or an unsolicited notification. Only the first two can
//! be told apart by content; the last two depend on whether a command is
//! currently pending on the channel.

/// Terminator appended to every command written to a channel.
pub const COMMAND_TERMINATOR: &str = "\r";

/// Ctrl-Z, ends an SMS PDU typed after the `"> "` prompt.
pub const CTRL_Z: &str = "\x1a";

/// Prefixes of final lines that end a reply successfully.
pub const SUCCESS_TOKENS: &[&str] = &["OK", "CONNECT"];

/// Prefixes of final lines that end a reply with an error.
pub const ERROR_TOKENS: &[&str] = &[
    "ERROR",
    "+CMS ERROR:",
    "+CME ERROR:",
    "NO CARRIER",
    "NO ANSWER",
    "NO DIALTONE",
    "BUSY",
];

/// Class of one framed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Ends the pending reply successfully.
    FinalSuccess,
    /// Ends the pending reply with an error.
    FinalError,
    /// Data belonging to the pending reply.
    Intermediate,
    /// Not tied to any command.
    Unsolicited,
}

impl LineClass {
    /// Whether this class ends a reply.
    pub fn is_final(self) -> bool {
        matches!(self, LineClass::FinalSuccess | LineClass::FinalError)
    }
}

/// Classify `line` given whether a command is pending on its channel.
pub fn classify(line: &str, command_pending: bool) -> LineClass {
    if SUCCESS_TOKENS.iter().any(|t| line.starts_with(t)) {
        LineClass::FinalSuccess
    } else if ERROR_TOKENS.iter().any(|t| line.starts_with(t)) {
        LineClass::FinalError
    } else if command_pending {
        LineClass::Intermediate
    } else {
        LineClass::Unsolicited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_tokens_are_final_regardless_of_pending() {
        assert_eq!(classify("OK", true), LineClass::FinalSuccess);
        assert_eq!(classify("OK", false), LineClass::FinalSuccess);
        assert_eq!(classify("CONNECT 115200", true), LineClass::FinalSuccess);
    }

    #[test]
    fn error_tokens_are_final() {
        assert_eq!(classify("ERROR", true), LineClass::FinalError);
        assert_eq!(classify("+CME ERROR: 10", true), LineClass::FinalError);
        assert_eq!(classify("+CMS ERROR: 500", true), LineClass::FinalError);
        assert_eq!(classify("NO CARRIER", false), LineClass::FinalError);
        assert_eq!(classify("BUSY", true), LineClass::FinalError);
    }

    #[test]
    fn data_lines_depend_on_pending() {
        assert_eq!(classify("+CSQ: 20,99", true), LineClass::Intermediate);
        assert_eq!(classify("+CSQ: 20,99", false), LineClass::Unsolicited);
        assert_eq!(classify("RING", false), LineClass::Unsolicited);
    }

    #[test]
    fn token_must_be_a_prefix() {
        assert_eq!(classify("+CGMI: OK Modems", true), LineClass::Intermediate);
        assert_eq!(classify(" OK", false), LineClass::Unsolicited);
    }

    #[test]
    fn is_final_only_for_final_classes() {
        assert!(LineClass::FinalSuccess.is_final());
        assert!(LineClass::FinalError.is_final());
        assert!(!LineClass::Intermediate.is_final());
        assert!(!LineClass::Unsolicited.is_final());
    }
}
