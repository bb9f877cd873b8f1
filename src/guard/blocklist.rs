//! Static address ranges and the dynamic block registry
//!
//! Static ranges are configured at startup and permanent. Dynamic blocks
//! are created by the gatekeeper when the limiter trips and expire after a
//! fixed duration; expired entries are evicted the next time they are read,
//! with a periodic sweep covering addresses that never come back.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// An inclusive [start, end] address interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticRange {
    start: IpAddr,
    end: IpAddr,
}

impl StaticRange {
    /// Parse a `"start-end"` range. Returns `None` when either endpoint is
    /// not a valid address or the interval is reversed.
    pub fn parse(s: &str) -> Option<Self> {
        let (start, end) = s.split_once('-')?;
        let start: IpAddr = start.trim().parse().ok()?;
        let end: IpAddr = end.trim().parse().ok()?;
        (start <= end).then_some(Self { start, end })
    }

    /// Inclusive at both ends. Addresses of a different family than the
    /// range never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        if ip.is_ipv4() != self.start.is_ipv4() {
            return false;
        }
        self.start <= ip && ip <= self.end
    }
}

/// Tracks blocked addresses: immutable static ranges plus per-address
/// dynamic block expiries.
pub struct BlockRegistry {
    ranges: Vec<StaticRange>,
    block_duration: Duration,
    dynamic: DashMap<String, Instant>,
}

impl BlockRegistry {
    pub fn new(ranges: Vec<StaticRange>, block_duration: Duration) -> Self {
        Self {
            ranges,
            block_duration,
            dynamic: DashMap::new(),
        }
    }

    /// Whether the address falls in a statically blocked range.
    pub fn in_static_range(&self, ip: IpAddr) -> bool {
        self.ranges.iter().any(|r| r.contains(ip))
    }

    /// Whether a dynamic block is still active for this address.
    ///
    /// An address is blocked iff its expiry is strictly in the future. An
    /// expired entry found here is removed.
    pub fn is_blocked(&self, addr: &str, now: Instant) -> bool {
        let active = match self.dynamic.get(addr) {
            Some(expiry) => *expiry > now,
            None => return false,
        };
        if !active {
            // Re-check under the entry lock: another request may have
            // re-blocked the address since the read above.
            self.dynamic.remove_if(addr, |_, expiry| *expiry <= now);
        }
        active
    }

    /// Block the address for the configured duration, starting at `now`.
    /// Re-blocking an already blocked address extends the expiry.
    pub fn block(&self, addr: &str, now: Instant) {
        self.dynamic.insert(addr.to_string(), now + self.block_duration);
    }

    /// Drop expired entries. Called periodically; correctness never
    /// depends on it.
    pub fn sweep(&self, now: Instant) {
        self.dynamic.retain(|_, expiry| *expiry > now);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.dynamic.len()
    }
}
