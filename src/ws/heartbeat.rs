//! Application-level liveness.
//!
//! The session's heartbeat task sends a probe every `interval`. A probe stays
//! pending until the server answers with a `pong` frame; data frames do not
//! count. Once the oldest pending probe is older than `timeout`, the monitor
//! reports [`HeartbeatStatus::Expired`] exactly once and the session is torn
//! down.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Probe cadence and the deadline for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl HeartbeatPolicy {
    /// Market data: probes every 10s, tolerates one missed answer.
    pub fn passive() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(20),
        }
    }

    /// Trading: every probe must be answered before the next one goes out.
    pub fn active() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    Alive,
    /// The pending probe went unanswered past the timeout. Reported once.
    Expired,
    AlreadyExpired,
}

#[derive(Debug, Default)]
struct Probe {
    pending_since: Option<Instant>,
    last_ack: Option<Instant>,
    expired: bool,
}

/// Liveness bookkeeping for one session.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    policy: HeartbeatPolicy,
    probe: Mutex<Probe>,
}

impl HeartbeatMonitor {
    pub fn new(policy: HeartbeatPolicy) -> Self {
        Self {
            policy,
            probe: Mutex::new(Probe::default()),
        }
    }

    pub fn policy(&self) -> HeartbeatPolicy {
        self.policy
    }

    /// A probe went out. Only the oldest unanswered probe is tracked.
    pub fn record_probe(&self, now: Instant) {
        let mut probe = self.probe.lock().unwrap_or_else(PoisonError::into_inner);
        if probe.pending_since.is_none() {
            probe.pending_since = Some(now);
        }
    }

    /// The server answered with `pong`.
    pub fn record_ack(&self, now: Instant) {
        let mut probe = self.probe.lock().unwrap_or_else(PoisonError::into_inner);
        probe.pending_since = None;
        probe.last_ack = Some(now);
    }

    pub fn last_ack(&self) -> Option<Instant> {
        self.probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_ack
    }

    pub fn check(&self, now: Instant) -> HeartbeatStatus {
        let mut probe = self.probe.lock().unwrap_or_else(PoisonError::into_inner);
        if probe.expired {
            return HeartbeatStatus::AlreadyExpired;
        }
        match probe.pending_since {
            Some(sent) if now.saturating_duration_since(sent) >= self.policy.timeout => {
                probe.expired = true;
                HeartbeatStatus::Expired
            }
            _ => HeartbeatStatus::Alive,
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
    fn test_presets() {
        assert_eq!(HeartbeatPolicy::passive().timeout, secs(20));
        assert_eq!(HeartbeatPolicy::active().timeout, secs(10));
        assert_eq!(HeartbeatPolicy::active().interval, secs(10));
    }

    #[test]
    fn test_expires_exactly_once() {
        let monitor = HeartbeatMonitor::new(HeartbeatPolicy::active());
        let t0 = Instant::now();
        monitor.record_probe(t0);
        assert_eq!(monitor.check(t0 + secs(5)), HeartbeatStatus::Alive);
        assert_eq!(monitor.check(t0 + secs(10)), HeartbeatStatus::Expired);
        assert_eq!(monitor.check(t0 + secs(11)), HeartbeatStatus::AlreadyExpired);
        assert_eq!(monitor.check(t0 + secs(30)), HeartbeatStatus::AlreadyExpired);
    }

    #[test]
    fn test_ack_clears_pending_probe() {
        let monitor = HeartbeatMonitor::new(HeartbeatPolicy::active());
        let t0 = Instant::now();
        monitor.record_probe(t0);
        monitor.record_ack(t0 + secs(1));
        assert_eq!(monitor.check(t0 + secs(15)), HeartbeatStatus::Alive);
        assert_eq!(monitor.last_ack(), Some(t0 + secs(1)));
    }

    #[test]
    fn test_oldest_probe_is_tracked() {
        let monitor = HeartbeatMonitor::new(HeartbeatPolicy::passive());
        let t0 = Instant::now();
        monitor.record_probe(t0);
        monitor.record_probe(t0 + secs(10));
        assert_eq!(monitor.check(t0 + secs(19)), HeartbeatStatus::Alive);
        assert_eq!(monitor.check(t0 + secs(20)), HeartbeatStatus::Expired);
    }

    #[test]
    fn test_no_probe_never_expires() {
        let monitor = HeartbeatMonitor::new(HeartbeatPolicy::active());
        let t0 = Instant::now();
        assert_eq!(monitor.check(t0 + secs(3600)), HeartbeatStatus::Alive);
    }
}
