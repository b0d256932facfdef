//! Per-operation flash counters.

use std::fmt;
use std::time::{Duration, Instant};

use super::FlashState;

/// Counters for one flash operation. Created fresh per update.
#[derive(Debug, Clone)]
pub struct FlashTracker {
    packets_sent: usize,
    bytes_sent: usize,
    timeouts: u32,
    retries: u32,
    retry_limit: u32,
    started: Instant,
    stopped: Option<Instant>,
    state: FlashState,
}

impl FlashTracker {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            packets_sent: 0,
            bytes_sent: 0,
            timeouts: 0,
            retries: 0,
            retry_limit,
            started: Instant::now(),
            stopped: None,
            state: FlashState::Next,
        }
    }

    /// Count an acknowledged packet.
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    /// A timeout is also a retry.
    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
        self.retries += 1;
    }

    /// More retries than the limit allows.
    pub fn budget_exhausted(&self) -> bool {
        self.retries > self.retry_limit
    }

    pub fn set_state(&mut self, state: FlashState) {
        self.state = state;
    }

    /// Freeze the clock and record the final state. Later calls are ignored.
    pub fn stop(&mut self, final_state: FlashState) {
        if self.stopped.is_none() {
            self.stopped = Some(Instant::now());
            self.state = final_state;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    pub fn state(&self) -> FlashState {
        self.state
    }

    pub fn packets_sent(&self) -> usize {
        self.packets_sent
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Time from creation to `stop`, or to now while running.
    pub fn elapsed(&self) -> Duration {
        self.stopped
            .unwrap_or_else(Instant::now)
            .duration_since(self.started)
    }
}

impl fmt::Display for FlashTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} packets / {} bytes in {:.2}s, retries {}/{}, timeouts {} [{}]",
            self.packets_sent,
            self.bytes_sent,
            self.elapsed().as_secs_f64(),
            self.retries,
            self.retry_limit,
            self.timeouts,
            self.state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_counts_as_retry() {
        let mut tracker = FlashTracker::new(1);
        tracker.record_timeout();
        assert_eq!(tracker.timeouts(), 1);
        assert_eq!(tracker.retries(), 1);
        assert!(!tracker.budget_exhausted());
        tracker.record_retry();
        assert!(tracker.budget_exhausted());
    }

    #[test]
    fn test_display_does_not_stop() {
        let mut tracker = FlashTracker::new(5);
        tracker.record_sent(32);
        let text = tracker.to_string();
        assert!(text.contains("1 packets / 32 bytes"));
        assert!(!tracker.is_stopped());
        assert_eq!(tracker.state(), FlashState::Next);
    }

    #[test]
    fn test_stop_is_sticky() {
        let mut tracker = FlashTracker::new(5);
        tracker.stop(FlashState::Giveup);
        let elapsed = tracker.elapsed();
        tracker.stop(FlashState::Success);
        assert_eq!(tracker.state(), FlashState::Giveup);
        assert_eq!(tracker.elapsed(), elapsed);
    }
}
