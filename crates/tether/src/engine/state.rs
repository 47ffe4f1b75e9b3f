//! Connection states.

use std::fmt;

/// Where the connection engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// About to dial, possibly after a backoff delay.
    Start,
    /// A transport is up and being serviced.
    Connected,
    /// The armed deadline elapsed.
    TimedOut,
    /// Tearing down the transport before dialing again.
    Reconnecting,
    /// Halted for good.
    Stopped,
}

impl ConnectionState {
    /// Whether the engine halts in this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Connected => "connected",
            Self::TimedOut => "timed_out",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stopped_is_terminal() {
        assert!(ConnectionState::Stopped.is_terminal());
        for state in [
            ConnectionState::Start,
            ConnectionState::Connected,
            ConnectionState::TimedOut,
            ConnectionState::Reconnecting,
        ] {
            assert!(!state.is_terminal(), "{state}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::TimedOut.to_string(), "timed_out");
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
