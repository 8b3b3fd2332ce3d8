//! RTT estimation and timestamp echo.
//!
//! Implements RFC 6298-style smoothing over samples obtained from echoed
//! 16-bit timestamps. Absolute times never cross the wire: each side stamps
//! records with its own wrapping millisecond clock, and the peer reflects the
//! latest stamp it saw, advanced by how long it held it.

use std::time::{Duration, Instant};

use crate::core::{ECHO_HOLD_LIMIT, MAX_IO_TIMEOUT, MAX_RTT_SAMPLE_MS, MIN_IO_TIMEOUT, TIMESTAMP_NONE};

/// RTT timing constants.
pub mod constants {
    /// SRTT before the first sample (ms).
    pub const INITIAL_SRTT_MS: f64 = 1000.0;

    /// RTTVAR before the first sample (ms).
    pub const INITIAL_RTTVAR_MS: f64 = 500.0;

    /// Alpha for SRTT smoothing (0.125 = 1/8).
    pub const SRTT_ALPHA: f64 = 0.125;

    /// Beta for RTTVAR smoothing (0.25 = 1/4).
    pub const RTTVAR_BETA: f64 = 0.25;

    /// K multiplier for RTO calculation (4.0 per RFC 6298).
    pub const RTO_K: f64 = 4.0;
}

/// Wrap a millisecond clock reading into a 16-bit timestamp.
///
/// Never returns [`TIMESTAMP_NONE`]; that value is reserved for "no echo".
pub fn timestamp16(ms: u64) -> u16 {
    let ts = (ms % 65536) as u16;
    if ts == TIMESTAMP_NONE { 0 } else { ts }
}

/// Elapsed milliseconds from `old` to `new`, modulo 2^16.
pub fn timestamp_diff(new: u16, old: u16) -> u16 {
    new.wrapping_sub(old)
}

/// RTT estimator implementing RFC 6298 smoothing.
///
/// Starts from a pessimistic 1000ms/500ms pair so the derived timeout sits
/// at its ceiling until a real sample arrives.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT in milliseconds.
    srtt: f64,
    /// RTT variance in milliseconds.
    rttvar: f64,
    /// Whether we've received the first RTT sample.
    hit: bool,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    /// Create a new RTT estimator with initial values.
    pub fn new() -> Self {
        Self {
            srtt: constants::INITIAL_SRTT_MS,
            rttvar: constants::INITIAL_RTTVAR_MS,
            hit: false,
        }
    }

    /// Feed one measured round trip, in milliseconds.
    ///
    /// - First measurement: SRTT = R, RTTVAR = R / 2
    /// - Subsequent: RTTVAR = 0.75 * RTTVAR + 0.25 * |SRTT - R|,
    ///   SRTT = 0.875 * SRTT + 0.125 * R
    ///
    /// Negative or non-finite samples are discarded. Returns whether the
    /// sample was recorded.
    pub fn record_sample(&mut self, rtt_ms: f64) -> bool {
        if !rtt_ms.is_finite() || rtt_ms < 0.0 {
            return false;
        }

        if !self.hit {
            self.srtt = rtt_ms;
            self.rttvar = rtt_ms / 2.0;
            self.hit = true;
        } else {
            self.rttvar = (1.0 - constants::RTTVAR_BETA) * self.rttvar
                + constants::RTTVAR_BETA * (self.srtt - rtt_ms).abs();
            self.srtt =
                (1.0 - constants::SRTT_ALPHA) * self.srtt + constants::SRTT_ALPHA * rtt_ms;
        }
        true
    }

    /// Feed one measured round trip.
    pub fn update(&mut self, sample: Duration) -> bool {
        self.record_sample(sample.as_secs_f64() * 1000.0)
    }

    /// Derived timeout: `ceil(SRTT + 4 * RTTVAR)` clamped to the I/O bounds.
    pub fn current_timeout(&self) -> Duration {
        let rto_ms = (self.srtt + constants::RTO_K * self.rttvar).ceil();
        let rto_ms = rto_ms.clamp(
            MIN_IO_TIMEOUT.as_millis() as f64,
            MAX_IO_TIMEOUT.as_millis() as f64,
        );
        Duration::from_millis(rto_ms as u64)
    }

    /// Get the current smoothed RTT in milliseconds.
    pub fn srtt_ms(&self) -> f64 {
        self.srtt
    }

    /// Get the current RTT variance in milliseconds.
    pub fn rttvar_ms(&self) -> f64 {
        self.rttvar
    }

    /// Check if the estimator has taken at least one sample.
    pub fn has_sample(&self) -> bool {
        self.hit
    }
}

/// Timestamp tracker for RTT measurement via timestamp echo.
#[derive(Debug, Clone)]
pub struct TimestampTracker {
    /// Origin of the local millisecond clock.
    start: Instant,
    /// Latest peer timestamp and when we received it.
    saved_peer: Option<(u16, Instant)>,
}

impl Default for TimestampTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampTracker {
    /// Create a new timestamp tracker.
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// Create a timestamp tracker with a specific clock origin.
    pub fn with_start(start: Instant) -> Self {
        Self {
            start,
            saved_peer: None,
        }
    }

    /// Current local 16-bit timestamp.
    pub fn now(&self) -> u16 {
        timestamp16(self.start.elapsed().as_millis() as u64)
    }

    /// Timestamp reply for the next outgoing record.
    ///
    /// The saved peer stamp is advanced by its hold time and consumed, so a
    /// stamp is echoed at most once. Stamps held past [`ECHO_HOLD_LIMIT`] are
    /// dropped since they would inflate the peer's estimate.
    pub fn take_reply(&mut self) -> Option<u16> {
        let (peer_ts, received_at) = self.saved_peer.take()?;
        let held = received_at.elapsed();
        if held >= ECHO_HOLD_LIMIT {
            return None;
        }
        let reply = peer_ts.wrapping_add(held.as_millis() as u16);
        (reply != TIMESTAMP_NONE).then_some(reply)
    }

    /// Process a received record's timestamps.
    ///
    /// Saves the peer's stamp for echoing and returns an RTT sample (ms) if
    /// the record carried a plausible echo of ours.
    pub fn on_receive(&mut self, peer_timestamp: u16, reply: Option<u16>) -> Option<f64> {
        self.saved_peer = Some((peer_timestamp, Instant::now()));

        let reply = reply?;
        let rtt = timestamp_diff(self.now(), reply);
        // A reply "from the future" wraps to a huge value and lands here too.
        (rtt < MAX_RTT_SAMPLE_MS).then_some(f64::from(rtt))
    }

    /// Whether a peer timestamp is waiting to be echoed.
    pub fn has_pending_reply(&self) -> bool {
        self.saved_peer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtt_estimator_initial() {
        let estimator = RttEstimator::new();
        assert!(!estimator.has_sample());
        // ceil(1000 + 4 * 500) clamped to the ceiling.
        assert_eq!(estimator.current_timeout(), MAX_IO_TIMEOUT);
    }

    #[test]
    fn test_rtt_estimator_first_sample() {
        let mut estimator = RttEstimator::new();
        assert!(estimator.record_sample(100.0));

        assert!(estimator.has_sample());
        assert!((estimator.srtt_ms() - 100.0).abs() < 0.01);
        assert!((estimator.rttvar_ms() - 50.0).abs() < 0.01);
        // 100 + 4 * 50 = 300
        assert_eq!(estimator.current_timeout(), Duration::from_millis(300));
    }

    #[test]
    fn test_rtt_estimator_multiple_samples() {
        let mut estimator = RttEstimator::new();
        estimator.record_sample(100.0);
        estimator.record_sample(120.0);

        // RTTVAR = 0.75 * 50 + 0.25 * 20 = 42.5
        assert!((estimator.rttvar_ms() - 42.5).abs() < 0.01);
        // SRTT = 0.875 * 100 + 0.125 * 120 = 102.5
        assert!((estimator.srtt_ms() - 102.5).abs() < 0.01);
        // ceil(102.5 + 170) = 273
        assert_eq!(estimator.current_timeout(), Duration::from_millis(273));
    }

    #[test]
    fn test_rtt_estimator_discards_degenerate() {
        let mut estimator = RttEstimator::new();
        assert!(!estimator.record_sample(-5.0));
        assert!(!estimator.record_sample(f64::NAN));
        assert!(!estimator.record_sample(f64::INFINITY));
        assert!(!estimator.has_sample());
        assert_eq!(estimator.current_timeout(), MAX_IO_TIMEOUT);
    }

    #[test]
    fn test_rtt_estimator_min_timeout() {
        let mut estimator = RttEstimator::new();
        estimator.update(Duration::from_micros(100));
        assert_eq!(estimator.current_timeout(), MIN_IO_TIMEOUT);
    }

    #[test]
    fn test_rtt_estimator_converges() {
        let mut estimator = RttEstimator::new();
        for _ in 0..200 {
            estimator.record_sample(40.0);
        }
        assert!((estimator.srtt_ms() - 40.0).abs() < 0.5);
        assert!(estimator.rttvar_ms() < 1.0);
        assert_eq!(estimator.current_timeout(), MIN_IO_TIMEOUT);
    }

    #[test]
    fn test_timestamp16_skips_sentinel() {
        assert_eq!(timestamp16(0), 0);
        assert_eq!(timestamp16(65534), 65534);
        assert_eq!(timestamp16(65535), 0);
        assert_eq!(timestamp16(65536), 0);
        assert_eq!(timestamp16(65537), 1);
    }

    #[test]
    fn test_timestamp_diff_wraps() {
        assert_eq!(timestamp_diff(150, 100), 50);
        assert_eq!(timestamp_diff(10, 65530), 16);
        assert_eq!(timestamp_diff(100, 100), 0);
    }

    #[test]
    fn test_timestamp_tracker_echo() {
        let mut tracker = TimestampTracker::new();
        let sent = tracker.now();

        std::thread::sleep(Duration::from_millis(10));
        let rtt = tracker.on_receive(2000, Some(sent)).unwrap();
        assert!(rtt >= 10.0);
        assert!(rtt < f64::from(MAX_RTT_SAMPLE_MS));
    }

    #[test]
    fn test_timestamp_tracker_no_reply() {
        let mut tracker = TimestampTracker::new();
        assert_eq!(tracker.on_receive(2000, None), None);
        assert!(tracker.has_pending_reply());
    }

    #[test]
    fn test_timestamp_tracker_future_reply_discarded() {
        let mut tracker = TimestampTracker::new();
        let ahead = tracker.now().wrapping_add(100);
        assert_eq!(tracker.on_receive(1, Some(ahead)), None);
    }

    #[test]
    fn test_reply_consumed_once() {
        let mut tracker = TimestampTracker::new();
        assert_eq!(tracker.take_reply(), None);

        tracker.on_receive(5000, None);
        let reply = tracker.take_reply().unwrap();
        assert!(timestamp_diff(reply, 5000) < 100);
        assert_eq!(tracker.take_reply(), None);
    }

    #[test]
    fn test_stale_reply_dropped() {
        let mut tracker = TimestampTracker::new();
        tracker.saved_peer = Some((5000, Instant::now() - Duration::from_millis(1500)));
        assert_eq!(tracker.take_reply(), None);
        assert!(!tracker.has_pending_reply());
    }
}
