//! Single-deadline timeout supervisor.
//!
//! Only one timeout is meaningful at a time: the client is either waiting to
//! connect, waiting on an idle peer, or waiting for a heartbeat reply. Arming
//! a new reason replaces the previous one, and a periodic clock tick asks
//! whether the current deadline has passed.

use std::time::Duration;

use tokio::time::Instant;

/// Why the supervisor is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutReason {
    /// Disarmed; ticks are ignored.
    None,
    /// Waiting for the handshake to complete.
    Connecting,
    /// Waiting for inbound traffic before sending a heartbeat.
    Activity,
    /// Waiting for the pong answering a heartbeat.
    PingAwait,
}

/// Tracks one `(reason, duration)` deadline measured from a start instant.
#[derive(Debug, Clone)]
pub struct TimeoutSupervisor {
    reason: TimeoutReason,
    duration: Duration,
    start: Instant,
}

impl TimeoutSupervisor {
    /// Create a disarmed supervisor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reason: TimeoutReason::None,
            duration: Duration::ZERO,
            start: Instant::now(),
        }
    }

    /// Currently armed reason.
    #[must_use]
    pub const fn reason(&self) -> TimeoutReason {
        self.reason
    }

    /// Currently armed duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Arm `reason` for `duration`, starting now.
    pub fn arm(&mut self, reason: TimeoutReason, duration: Duration) {
        self.arm_at(reason, duration, Instant::now());
    }

    /// Arm `reason` for `duration`, starting at `start`.
    pub fn arm_at(&mut self, reason: TimeoutReason, duration: Duration, start: Instant) {
        self.reason = reason;
        self.duration = duration;
        self.start = start;
    }

    /// Restart the current deadline from now, keeping its reason.
    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    /// Restart the current deadline from `start`, keeping its reason.
    pub fn touch_at(&mut self, start: Instant) {
        self.start = start;
    }

    /// Disarm the supervisor.
    pub fn disarm(&mut self) {
        self.reason = TimeoutReason::None;
    }

    /// Instant the armed deadline falls due, `None` when disarmed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match self.reason {
            TimeoutReason::None => None,
            _ => Some(self.start + self.duration),
        }
    }

    /// Whether the deadline has elapsed at `tick`.
    #[must_use]
    pub fn is_expired(&self, tick: Instant) -> bool {
        if self.reason == TimeoutReason::None {
            return false;
        }
        tick.saturating_duration_since(self.start) >= self.duration
    }
}

impl Default for TimeoutSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_disarmed_never_expires() {
        let supervisor = TimeoutSupervisor::new();
        assert_eq!(supervisor.reason(), TimeoutReason::None);
        assert!(!supervisor.is_expired(Instant::now() + secs(3600)));
    }

    #[test]
    fn test_expires_at_deadline() {
        let t0 = Instant::now();
        let mut supervisor = TimeoutSupervisor::new();
        supervisor.arm_at(TimeoutReason::Activity, secs(10), t0);

        assert!(!supervisor.is_expired(t0 + secs(9)));
        assert!(supervisor.is_expired(t0 + secs(10)));
        assert!(supervisor.is_expired(t0 + secs(11)));
    }

    #[test]
    fn test_rearm_supersedes_previous_reason() {
        let t0 = Instant::now();
        let mut supervisor = TimeoutSupervisor::new();
        supervisor.arm_at(TimeoutReason::Connecting, secs(10), t0);
        supervisor.arm_at(TimeoutReason::Activity, secs(120), t0 + secs(5));

        // Past the old Connecting deadline, well within the new one.
        assert!(!supervisor.is_expired(t0 + secs(11)));
        assert_eq!(supervisor.reason(), TimeoutReason::Activity);
        assert!(supervisor.is_expired(t0 + secs(125)));
    }

    #[test]
    fn test_touch_extends_deadline_keeping_reason() {
        let t0 = Instant::now();
        let mut supervisor = TimeoutSupervisor::new();
        supervisor.arm_at(TimeoutReason::PingAwait, secs(30), t0);
        supervisor.touch_at(t0 + secs(20));

        assert_eq!(supervisor.reason(), TimeoutReason::PingAwait);
        assert!(!supervisor.is_expired(t0 + secs(40)));
        assert!(supervisor.is_expired(t0 + secs(50)));
    }

    #[test]
    fn test_stale_tick_before_start_is_not_expired() {
        let t0 = Instant::now();
        let mut supervisor = TimeoutSupervisor::new();
        supervisor.arm_at(TimeoutReason::Activity, secs(1), t0 + secs(10));
        assert!(!supervisor.is_expired(t0));
    }

    #[test]
    fn test_deadline_follows_rearm_and_touch() {
        let t0 = Instant::now();
        let mut supervisor = TimeoutSupervisor::new();
        assert_eq!(supervisor.deadline(), None);

        supervisor.arm_at(TimeoutReason::Activity, secs(10), t0);
        assert_eq!(supervisor.deadline(), Some(t0 + secs(10)));

        supervisor.touch_at(t0 + secs(4));
        assert_eq!(supervisor.deadline(), Some(t0 + secs(14)));

        supervisor.arm_at(TimeoutReason::PingAwait, secs(5), t0 + secs(6));
        assert_eq!(supervisor.deadline(), Some(t0 + secs(11)));

        supervisor.disarm();
        assert_eq!(supervisor.deadline(), None);
    }

    #[test]
    fn test_disarm() {
        let t0 = Instant::now();
        let mut supervisor = TimeoutSupervisor::new();
        supervisor.arm_at(TimeoutReason::Activity, secs(1), t0);
        supervisor.disarm();
        assert!(!supervisor.is_expired(t0 + secs(5)));
    }
}
