//! Async coalescing cache.
//!
//! Same contract as [`CoalescingCache`](crate::CoalescingCache), but the
//! computation is a future and followers suspend their task instead of
//! blocking a thread. The leader drives the future itself; nothing is
//! spawned.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::trace;

use stampede_core::{CacheConfig, Clock};

use crate::coalescer::{Coalescer, LeaderGuard, Role};
use crate::flight::{FlightState, Record};
use crate::stats::CacheStats;

/// Record whose followers await a `watch` channel.
#[derive(Debug)]
pub(crate) struct AsyncFlight<V, E> {
    deadline: Instant,
    state: watch::Sender<FlightState<V, E>>,
}

impl<V: Clone, E: Clone> AsyncFlight<V, E> {
    /// Waits until the flight finishes.
    ///
    /// Returns `None` if the leader abandoned it.
    async fn wait(&self) -> Option<Result<V, E>> {
        let mut rx = self.state.subscribe();
        let outcome = match rx.wait_for(|state| !state.is_pending()).await {
            Ok(state) => state.outcome(),
            Err(_) => None,
        };
        outcome
    }
}

impl<V: Send + Sync, E: Send + Sync> Record<V, E> for AsyncFlight<V, E> {
    fn start(deadline: Instant) -> Self {
        let (state, _) = watch::channel(FlightState::Pending);
        Self { deadline, state }
    }

    fn deadline(&self) -> Instant {
        self.deadline
    }

    fn is_pending(&self) -> bool {
        self.state.borrow().is_pending()
    }

    fn complete(&self, outcome: Result<V, E>) {
        self.state.send_if_modified(|state| {
            if !state.is_pending() {
                return false;
            }
            *state = FlightState::Done(outcome);
            true
        });
    }

    fn abandon(&self) {
        self.state.send_if_modified(|state| {
            if !state.is_pending() {
                return false;
            }
            *state = FlightState::Abandoned;
            true
        });
    }
}

/// Async single-entry TTL cache that runs at most one computation at a time.
///
/// If the leader's future is dropped before it resolves (for example because
/// its task was aborted), waiting callers are released and one of them runs
/// the computation instead.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use stampede_cache::AsyncCoalescingCache;
///
/// # tokio_test::block_on(async {
/// let cache: AsyncCoalescingCache<u64, String> = AsyncCoalescingCache::new();
/// let value = cache
///     .execute(Duration::from_millis(500), || async { Ok(42) })
///     .await;
/// assert_eq!(value, Ok(42));
/// # });
/// ```
pub struct AsyncCoalescingCache<V, E> {
    inner: Coalescer<V, E, AsyncFlight<V, E>>,
}

impl<V, E> AsyncCoalescingCache<V, E>
where
    V: Clone + Send + Sync,
    E: Clone + Send + Sync,
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
    /// See [`CoalescingCache::execute`](crate::CoalescingCache::execute) for
    /// the full contract.
    pub async fn execute<F, Fut>(&self, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.inner.lookup() {
            return Ok(value);
        }

        loop {
            match self.inner.elect(ttl) {
                Role::Leader(flight) => {
                    let guard = LeaderGuard::new(&self.inner, flight);
                    let outcome = compute().await;
                    return guard.finish(outcome);
                }
                Role::Follower(flight) => {
                    if let Some(outcome) = flight.wait().await {
                        self.inner.record_follower();
                        return outcome;
                    }
                    trace!("Computation abandoned, retrying election");
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), using the configured default TTL.
    pub async fn execute_default<F, Fut>(&self, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let ttl = self.inner.config().default_ttl();
        self.execute(ttl, compute).await
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
    /// Does not cancel a computation already running; see
    /// [`CoalescingCache::reset`](crate::CoalescingCache::reset).
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

impl<V, E> Default for AsyncCoalescingCache<V, E>
where
    V: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::join_all;
    use stampede_core::ManualClock;
    use tokio::sync::{Barrier, Notify};

    const TTL: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_concurrent_tasks_share_one_computation() {
        let cache: Arc<AsyncCoalescingCache<&'static str, String>> =
            Arc::new(AsyncCoalescingCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(10));

        let tasks = (0..10).map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .execute(TTL, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok("B")
                    })
                    .await
            })
        });

        let results = join_all(tasks).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), Ok("B"));
        }
        assert_eq!(cache.stats().leaders, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_with_manual_clock() {
        let clock = ManualClock::new();
        let cache: AsyncCoalescingCache<u32, String> =
            AsyncCoalescingCache::new().with_clock(clock.clone());

        assert_eq!(cache.execute(TTL, || async { Ok(1) }).await, Ok(1));
        clock.advance(Duration::from_millis(500));
        assert_eq!(cache.execute(TTL, || async { Ok(2) }).await, Ok(1));
        clock.advance(Duration::from_millis(700));
        assert_eq!(cache.execute(TTL, || async { Ok(3) }).await, Ok(3));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.leaders, 2);
    }

    #[tokio::test]
    async fn test_error_not_cached() {
        let cache: AsyncCoalescingCache<u32, String> = AsyncCoalescingCache::new();

        let first = cache
            .execute(TTL, || async { Err("upstream".to_string()) })
            .await;
        assert_eq!(first, Err("upstream".to_string()));

        let second = cache.execute(TTL, || async { Ok(5) }).await;
        assert_eq!(second, Ok(5));
        assert_eq!(cache.stats().failures, 1);
        assert_eq!(cache.stats().leaders, 2);
    }

    #[tokio::test]
    async fn test_reset_clears_value() {
        let cache: AsyncCoalescingCache<u32, String> = AsyncCoalescingCache::new();
        cache.execute(TTL, || async { Ok(1) }).await.unwrap();

        cache.reset();

        assert_eq!(cache.peek(), None);
        assert_eq!(cache.execute(TTL, || async { Ok(2) }).await, Ok(2));
    }

    #[tokio::test]
    async fn test_aborted_leader_releases_followers() {
        let cache: Arc<AsyncCoalescingCache<u32, String>> = Arc::new(AsyncCoalescingCache::new());
        let leader_started = Arc::new(Notify::new());

        let leader = {
            let cache = cache.clone();
            let leader_started = leader_started.clone();
            tokio::spawn(async move {
                cache
                    .execute(TTL, || async move {
                        leader_started.notify_one();
                        std::future::pending::<Result<u32, String>>().await
                    })
                    .await
            })
        };

        leader_started.notified().await;
        assert!(cache.is_in_flight());

        let follower = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.execute(TTL, || async { Ok(11) }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());

        assert_eq!(follower.await.unwrap(), Ok(11));
        let stats = cache.stats();
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.leaders, 2);
        assert_eq!(stats.followers, 0);
        assert_eq!(stats.calls(), 2);
    }

    #[tokio::test]
    async fn test_overrunning_leader_loses_ratchet() {
        let clock = ManualClock::new();
        let cache: Arc<AsyncCoalescingCache<&'static str, String>> =
            Arc::new(AsyncCoalescingCache::new().with_clock(clock.clone()));
        let first_started = Arc::new(Notify::new());
        let first_release = Arc::new(Notify::new());

        let first = {
            let cache = cache.clone();
            let first_started = first_started.clone();
            let first_release = first_release.clone();
            tokio::spawn(async move {
                cache
                    .execute(TTL, || async move {
                        first_started.notify_one();
                        first_release.notified().await;
                        Ok("old")
                    })
                    .await
            })
        };

        first_started.notified().await;
        // The first computation overruns its own deadline.
        clock.advance(Duration::from_millis(1_500));
        assert!(!cache.is_in_flight());
        assert_eq!(cache.execute(TTL, || async { Ok("new") }).await, Ok("new"));

        first_release.notify_one();
        assert_eq!(first.await.unwrap(), Ok("old"));

        assert_eq!(cache.peek(), Some("new"));
        let stats = cache.stats();
        assert_eq!(stats.leaders, 2);
        assert_eq!(stats.rejected_publishes, 1);
    }

    #[tokio::test]
    async fn test_phantom_repopulation_after_reset() {
        let cache: Arc<AsyncCoalescingCache<&'static str, String>> =
            Arc::new(AsyncCoalescingCache::new());
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let slow = {
            let cache = cache.clone();
            let started = started.clone();
            let release = release.clone();
            tokio::spawn(async move {
                cache
                    .execute(TTL, || async move {
                        started.notify_one();
                        release.notified().await;
                        Ok("phantom")
                    })
                    .await
            })
        };

        started.notified().await;
        cache.reset();
        assert!(!cache.is_in_flight());
        assert_eq!(cache.peek(), None);

        release.notify_one();
        assert_eq!(slow.await.unwrap(), Ok("phantom"));

        // The computation that outlived the reset still published its value.
        assert_eq!(cache.peek(), Some("phantom"));
        assert_eq!(cache.stats().resets, 1);
    }

    #[tokio::test]
    async fn test_execute_default() {
        let cache: AsyncCoalescingCache<u32, String> =
            AsyncCoalescingCache::with_config(CacheConfig::with_default_ttl(Duration::from_secs(60)));

        assert_eq!(cache.execute_default(|| async { Ok(1) }).await, Ok(1));
        assert_eq!(cache.execute_default(|| async { Ok(2) }).await, Ok(1));
    }

    #[test]
    fn test_execute_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let cache: AsyncCoalescingCache<String, String> = AsyncCoalescingCache::new();
        let fut = cache.execute(TTL, || async { Ok(String::new()) });
        assert_send(&fut);
    }
}
