//! Per-command response timeouts.
//!
//! The table is scanned top to bottom and the first entry whose prefix the
//! command starts with wins. Several entries overlap on purpose (`AT+CPIN?`
//! vs `AT+CPIN`, `AT+COPS=?` vs `AT+COPS`), so a more specific prefix must be
//! listed above any more general one that would shadow it. The order is
//! part of the behaviour; do not sort this table.

use std::time::Duration;

use modemlink_core::error::{Error, Result};

/// Catch-all prefix every AT command matches.
pub const DEFAULT_PREFIX: &str = "AT";

/// The built-in table as (prefix, seconds).
pub const DEFAULT_TABLE: &[(&str, u64)] = &[
    ("AT+CPIN?", 8),
    ("AT+CPIN", 50),
    ("AT+CPWD", 50),
    ("AT+CLCK", 30),
    ("AT+COPS=?", 180),
    ("AT+COPS?", 10),
    ("AT+COPS", 120),
    ("AT+CGACT", 150),
    ("AT+CGDATA", 150),
    ("AT+CFUN", 40),
    ("AT+CMGS", 60),
    ("AT+CMGW", 60),
    ("AT+CUSD", 60),
    ("AT+CCFC", 60),
    ("AT+CCWA", 60),
    ("AT+CLIR", 60),
    ("AT+CRSM", 30),
    ("AT+CSIM", 30),
    ("AT+CCHO", 30),
    ("AT+CCHC", 30),
    ("AT+CGLA", 30),
    ("AT+CHLD", 40),
    ("AT+CLCC", 10),
    ("AT+CMUX", 10),
    ("ATD", 60),
    ("ATA", 40),
    ("ATH", 20),
    (DEFAULT_PREFIX, 20),
];

/// One (prefix, timeout) row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutEntry {
    /// Literal command prefix.
    pub prefix: String,
    /// Time allowed for the final response.
    pub timeout: Duration,
}

/// Ordered, first-match-wins command timeout table.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    entries: Vec<TimeoutEntry>,
}

impl TimeoutPolicy {
    /// Build a policy from custom rows.
    ///
    /// The last row must be the [`DEFAULT_PREFIX`] catch-all so every
    /// command gets a timeout.
    pub fn new(entries: Vec<TimeoutEntry>) -> Result<Self> {
        match entries.last() {
            Some(last) if last.prefix == DEFAULT_PREFIX => Ok(TimeoutPolicy { entries }),
            _ => Err(Error::InvalidParameter(format!(
                "timeout table must end with a \"{DEFAULT_PREFIX}\" default entry"
            ))),
        }
    }

    /// Timeout for `command`: the first matching row, or the default row
    /// for text that does not even start with `AT` (e.g. an SMS PDU).
    pub fn lookup(&self, command: &str) -> Duration {
        self.entries
            .iter()
            .find(|e| command.starts_with(e.prefix.as_str()))
            .or(self.entries.last())
            .map(|e| e.timeout)
            .unwrap_or(Duration::from_secs(20))
    }

    /// The rows in match order.
    pub fn entries(&self) -> &[TimeoutEntry] {
        &self.entries
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        TimeoutPolicy {
            entries: DEFAULT_TABLE
                .iter()
                .map(|&(prefix, secs)| TimeoutEntry {
                    prefix: prefix.to_string(),
                    timeout: Duration::from_secs(secs),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn pin_query_and_pin_entry_differ() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.lookup("AT+CPIN?"), secs(8));
        assert_eq!(policy.lookup("AT+CPIN=1234"), secs(50));
    }

    #[test]
    fn operator_scan_beats_operator_set() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.lookup("AT+COPS=?"), secs(180));
        assert_eq!(policy.lookup("AT+COPS?"), secs(10));
        assert_eq!(policy.lookup("AT+COPS=0"), secs(120));
    }

    #[test]
    fn unknown_command_gets_default() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.lookup("AT+CGSN"), secs(20));
        assert_eq!(policy.lookup("0011000B916407281553F80000AA0AE8329BFD4697D9EC37"), secs(20));
    }

    #[test]
    fn first_match_wins_over_longest_match() {
        let policy = TimeoutPolicy::new(vec![
            TimeoutEntry {
                prefix: "AT+CPIN".into(),
                timeout: secs(50),
            },
            TimeoutEntry {
                prefix: "AT+CPIN?".into(),
                timeout: secs(8),
            },
            TimeoutEntry {
                prefix: DEFAULT_PREFIX.into(),
                timeout: secs(20),
            },
        ])
        .unwrap();
        // The shadowed, more specific row is never reached.
        assert_eq!(policy.lookup("AT+CPIN?"), secs(50));
    }

    #[test]
    fn default_table_keeps_specific_rows_above_general_ones() {
        let policy = TimeoutPolicy::default();
        let entries = policy.entries();
        for (i, general) in entries.iter().enumerate() {
            for specific in &entries[i + 1..] {
                assert!(
                    !specific.prefix.starts_with(general.prefix.as_str())
                        || general.prefix == DEFAULT_PREFIX,
                    "{} is shadowed by {}",
                    specific.prefix,
                    general.prefix
                );
            }
        }
    }

    #[test]
    fn custom_table_requires_default_row() {
        let result = TimeoutPolicy::new(vec![TimeoutEntry {
            prefix: "ATD".into(),
            timeout: secs(60),
        }]);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(matches!(TimeoutPolicy::new(Vec::new()), Err(Error::InvalidParameter(_))));
    }
}
