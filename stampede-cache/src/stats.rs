//! Cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of a cache's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Calls answered from the cached value
    pub hits: u64,
    /// Computations launched
    pub leaders: u64,
    /// Calls that joined a computation already in flight and got its outcome
    ///
    /// A caller whose leader was abandoned is counted by where it ends up,
    /// so each call lands in exactly one of `hits`, `leaders` or `followers`.
    pub followers: u64,
    /// Computations that returned an error
    pub failures: u64,
    /// Successful results that lost the ratchet to a later deadline
    pub rejected_publishes: u64,
    /// Computations that panicked or were cancelled before finishing
    pub abandoned: u64,
    /// Calls to `reset`
    pub resets: u64,
}

impl CacheStats {
    /// Total calls that reached the cache.
    pub fn calls(&self) -> u64 {
        self.hits + self.leaders + self.followers
    }

    /// Fraction of calls that did not launch a computation.
    pub fn dedup_ratio(&self) -> f64 {
        let calls = self.calls();
        if calls == 0 {
            return 0.0;
        }
        (self.hits + self.followers) as f64 / calls as f64
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    leaders: AtomicU64,
    followers: AtomicU64,
    failures: AtomicU64,
    rejected_publishes: AtomicU64,
    abandoned: AtomicU64,
    resets: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn leader(&self) {
        self.leaders.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn follower(&self) {
        self.followers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rejected_publish(&self) {
        self.rejected_publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            leaders: self.leaders.load(Ordering::Relaxed),
            followers: self.followers.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejected_publishes: self.rejected_publishes.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}
