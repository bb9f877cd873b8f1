//! Sliding-window request counting per source address
//!
//! Tracks the timestamps of recent requests for each address. Stale
//! timestamps are pruned on every access, not on a timer, so a read always
//! sees an up-to-date window.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// In-memory sliding-window limiter keyed by source address.
///
/// The prune-append-count sequence runs under the map's per-key entry
/// guard, so concurrent requests from the same address cannot lose updates.
pub struct SlidingWindow {
    window: Duration,
    hits: DashMap<String, Vec<Instant>>,
}

impl SlidingWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            hits: DashMap::new(),
        }
    }

    /// Record a request from `addr` at `now` and return how many requests
    /// the address has made inside the current window, including this one.
    ///
    /// Exceeding a limit is the caller's call to make; this only counts.
    pub fn observe(&self, addr: &str, now: Instant) -> usize {
        let mut times = self.hits.entry(addr.to_string()).or_default();
        times.retain(|t| now.duration_since(*t) < self.window);
        times.push(now);
        times.len()
    }

    /// Drop all recorded timestamps for an address.
    ///
    /// Called when a dynamic block is created, so the address starts with a
    /// fresh window once the block lapses.
    pub fn forget(&self, addr: &str) {
        self.hits.remove(addr);
    }

    /// Drop addresses whose newest timestamp has fallen out of the window.
    /// Called periodically; correctness never depends on it.
    pub fn sweep(&self, now: Instant) {
        self.hits
            .retain(|_, times| times.last().is_some_and(|t| now.duration_since(*t) < self.window));
    }

    /// Number of addresses currently tracked.
    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.hits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_requests_inside_window() {
        let limiter = SlidingWindow::new(Duration::from_secs(60));
        let start = Instant::now();

        for i in 1..=5 {
            assert_eq!(limiter.observe("1.2.3.4", start), i);
        }
    }

    #[test]
    fn addresses_are_independent() {
        let limiter = SlidingWindow::new(Duration::from_secs(60));
        let start = Instant::now();

        assert_eq!(limiter.observe("1.2.3.4", start), 1);
        assert_eq!(limiter.observe("5.6.7.8", start), 1);
        assert_eq!(limiter.observe("1.2.3.4", start), 2);
    }

    #[test]
    fn prunes_timestamps_older_than_window() {
        let limiter = SlidingWindow::new(Duration::from_secs(60));
        let start = Instant::now();

        assert_eq!(limiter.observe("1.2.3.4", start), 1);
        assert_eq!(limiter.observe("1.2.3.4", start + Duration::from_secs(30)), 2);

        // The first timestamp is now exactly one window old and must be gone.
        assert_eq!(limiter.observe("1.2.3.4", start + Duration::from_secs(60)), 2);

        // Far past the window everything before is pruned.
        assert_eq!(limiter.observe("1.2.3.4", start + Duration::from_secs(200)), 1);
    }

    #[test]
    fn forget_clears_the_window() {
        let limiter = SlidingWindow::new(Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..10 {
            limiter.observe("1.2.3.4", start);
        }
        limiter.forget("1.2.3.4");
        assert_eq!(limiter.observe("1.2.3.4", start), 1);
    }

    #[test]
    fn sweep_drops_stale_addresses() {
        let limiter = SlidingWindow::new(Duration::from_secs(60));
        let start = Instant::now();

        limiter.observe("1.2.3.4", start);
        limiter.observe("5.6.7.8", start + Duration::from_secs(59));
        assert_eq!(limiter.tracked(), 2);

        limiter.sweep(start + Duration::from_secs(61));
        assert_eq!(limiter.tracked(), 1);
    }
}
