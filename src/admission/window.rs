//! Sliding-window counter over persisted epoch-millisecond timestamps

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct SlidingWindow {
    max_requests: usize,
    window_ms: i64,
}

impl SlidingWindow {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window_ms: window.as_millis() as i64,
        }
    }

    /// Drops every timestamp not strictly newer than `now - window`.
    pub fn prune(&self, log: &mut Vec<i64>, now: i64) {
        let horizon = now - self.window_ms;
        log.retain(|&t| t > horizon);
    }

    /// Wait time until the oldest entry leaves the window, if the (pruned) log is full.
    pub fn retry_after(&self, log: &[i64], now: i64) -> Option<Duration> {
        if log.len() < self.max_requests {
            return None;
        }
        let window_start = log.iter().copied().min().unwrap_or(now);
        let wait_ms = (window_start + self.window_ms - now).max(1);
        Some(Duration::from_millis(wait_ms as u64))
    }
}
