//! Blocking coalescing cache.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use stampede_core::{CacheConfig, Clock};

use crate::coalescer::{Coalescer, LeaderGuard, Role};
use crate::flight::Flight;
use crate::stats::CacheStats;

/// Single-entry TTL cache that runs at most one computation at a time.
///
/// Callers that miss the cache while a computation is in flight block their
/// thread until it finishes and receive a clone of its outcome. The
/// computation always runs on the calling thread of the leader; the cache
/// owns no threads.
///
/// Both `V` and `E` are cloned out to every caller. Wrap them in `Arc` if
/// cloning is expensive or impossible.
///
/// # Thread Safety
///
/// `CoalescingCache` is `Send + Sync` when `V` and `E` are; share it by
/// reference or through an `Arc`.
pub struct CoalescingCache<V, E> {
    inner: Coalescer<V, E, Flight<V, E>>,
}

impl<V, E> CoalescingCache<V, E>
where
    V: Clone + Send,
    E: Clone + Send,
{
    /// Creates a cache with default configuration and the system clock.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Creates a cache with custom configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            inner: Coalescer::new(config),
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.inner.set_clock(Arc::new(clock));
        self
    }

    /// Returns the cached value, or computes it exactly once for all
    /// concurrent callers.
    ///
    /// - If a value is cached and still valid, it is returned and `compute`
    ///   is not called.
    /// - Otherwise, if another caller's computation started less than its own
    ///   `ttl` ago, this call blocks until it finishes and returns its outcome.
    /// - Otherwise this caller runs `compute`. A success is cached for `ttl`
    ///   (measured from when the computation started); an error is returned
    ///   to everyone waiting on it and not cached.
    ///
    /// # Panics
    ///
    /// If `compute` panics the panic propagates to this caller. Callers
    /// waiting on it are released and one of them retries the computation.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use stampede_cache::CoalescingCache;
    ///
    /// let cache: CoalescingCache<u64, String> = CoalescingCache::new();
    /// let value = cache.execute(Duration::from_millis(500), || Ok(42));
    /// assert_eq!(value, Ok(42));
    /// ```
    pub fn execute<F>(&self, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.inner.lookup() {
            return Ok(value);
        }

        loop {
            match self.inner.elect(ttl) {
                Role::Leader(flight) => {
                    let guard = LeaderGuard::new(&self.inner, flight);
                    return guard.finish(compute());
                }
                Role::Follower(flight) => {
                    if let Some(outcome) = flight.wait() {
                        self.inner.record_follower();
                        return outcome;
                    }
                    trace!("Computation abandoned, retrying election");
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), using the configured default TTL.
    pub fn execute_default<F>(&self, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let ttl = self.inner.config().default_ttl();
        self.execute(ttl, compute)
    }

    /// Returns the cached value if it is still valid, without computing.
    pub fn peek(&self) -> Option<V> {
        self.inner.peek()
    }

    /// Returns true if a computation is running that new callers would join.
    pub fn is_in_flight(&self) -> bool {
        self.inner.is_in_flight()
    }

    /// Clears the cached value and forgets the computation in flight.
    ///
    /// The next call always computes. A computation that was already running
    /// is not cancelled: its callers still get its outcome, and a success
    /// may still be cached when it finishes.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Returns the cache's counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    /// Returns the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        self.inner.config()
    }
}

impl<V, E> Default for CoalescingCache<V, E>
where
    V: Clone + Send,
    E: Clone + Send,
{
    fn default() -> Self {
        Self::new()
    }
}
