//! Reconnection scheduling.
//!
//! Purely timestamp-based: callers ask [`Backoff::is_due`] and, if it is not,
//! return immediately. Nothing here sleeps.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::{RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY, RECONNECT_MAX_EXPONENT};

/// Delay before the next attempt after `attempt` consecutive failures.
///
/// `base * 2^min(attempt, max_exponent)`, clamped to `max`.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(RECONNECT_MAX_EXPONENT);
    RECONNECT_BASE_DELAY
        .saturating_mul(1u32 << exponent)
        .min(RECONNECT_MAX_DELAY)
}

/// Exponential backoff state for one outage.
///
/// Created when the connection is lost and dropped on the first successful
/// reconnection, which resets the attempt count.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    next_retry: Instant,
}

impl Backoff {
    /// Start a new outage: first attempt is due immediately.
    pub fn new(now: Instant) -> Self {
        Self {
            attempt: 0,
            next_retry: now,
        }
    }

    /// Failed attempts so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Earliest instant the next attempt may run.
    pub fn next_retry(&self) -> Instant {
        self.next_retry
    }

    /// Whether an attempt may run at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_retry
    }

    /// Record a failed attempt made at `now`; returns the delay scheduled.
    pub fn on_failure(&mut self, now: Instant) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let delay = reconnect_delay(self.attempt);
        self.next_retry = now + delay;
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_schedule() {
        assert_eq!(reconnect_delay(0), Duration::from_millis(100));
        assert_eq!(reconnect_delay(1), Duration::from_millis(200));
        assert_eq!(reconnect_delay(2), Duration::from_millis(400));
        assert_eq!(reconnect_delay(5), Duration::from_millis(3200));
        assert_eq!(reconnect_delay(6), Duration::from_millis(3200));
        assert_eq!(reconnect_delay(u32::MAX), Duration::from_millis(3200));
    }

    #[test]
    fn test_delay_monotonic_and_capped() {
        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = reconnect_delay(attempt);
            assert!(delay >= previous, "attempt {attempt}");
            assert!(delay <= RECONNECT_MAX_DELAY);
            previous = delay;
        }
    }

    #[test]
    fn test_first_attempt_due_immediately() {
        let now = Instant::now();
        let backoff = Backoff::new(now);
        assert!(backoff.is_due(now));
        assert_eq!(backoff.attempt(), 0);
    }

    #[test]
    fn test_failure_defers_next_attempt() {
        let now = Instant::now();
        let mut backoff = Backoff::new(now);

        let delay = backoff.on_failure(now);
        assert_eq!(delay, Duration::from_millis(200));
        assert_eq!(backoff.attempt(), 1);
        assert!(!backoff.is_due(now));
        assert!(!backoff.is_due(now + Duration::from_millis(199)));
        assert!(backoff.is_due(now + delay));
    }

    #[test]
    fn test_successive_failures_grow() {
        let mut now = Instant::now();
        let mut backoff = Backoff::new(now);
        let mut previous = Duration::ZERO;
        for _ in 0..10 {
            let delay = backoff.on_failure(now);
            assert!(delay >= previous);
            assert!(delay <= RECONNECT_MAX_DELAY);
            previous = delay;
            now = backoff.next_retry();
        }
        assert_eq!(previous, Duration::from_millis(3200));
    }
}
