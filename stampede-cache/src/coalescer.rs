//! Bookkeeping shared by the blocking and async caches.
//!
//! Two independent lock domains:
//!
//! - `snapshot`: read-mostly, a shared lock so fast-path reads never block
//!   each other
//! - `slot`: a short mutex that only guards the pointer to the current
//!   record, never the computation itself
//!
//! `reset` is the only place both are held, always snapshot first.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use stampede_core::{CacheConfig, SharedClock, SystemClock};

use crate::flight::Record;
use crate::snapshot::{deadline_after, Snapshot};
use crate::stats::{CacheStats, StatsRecorder};

/// Outcome of inspecting the call slot on a cache miss.
pub(crate) enum Role<R> {
    /// This caller published a new record and must run the computation.
    Leader(Arc<R>),
    /// A record with an unexpired deadline exists; wait on it.
    Follower(Arc<R>),
}

pub(crate) struct Coalescer<V, E, R> {
    snapshot: RwLock<Snapshot<V>>,
    slot: Mutex<Option<Arc<R>>>,
    clock: SharedClock,
    config: CacheConfig,
    stats: StatsRecorder,
    _error: PhantomData<fn() -> E>,
}

impl<V, E, R> Coalescer<V, E, R> {
    pub(crate) fn new(config: CacheConfig) -> Self {
        Self {
            snapshot: RwLock::new(Snapshot::empty()),
            slot: Mutex::new(None),
            clock: Arc::new(SystemClock),
            config,
            stats: StatsRecorder::default(),
            _error: PhantomData,
        }
    }

    pub(crate) fn set_clock(&mut self, clock: SharedClock) {
        self.clock = clock;
    }

    pub(crate) fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Counts a follower once it has received its leader's outcome.
    ///
    /// Not counted at election: a follower whose leader is abandoned runs
    /// election again and may end up leading.
    pub(crate) fn record_follower(&self) {
        self.stats.follower();
    }

    /// Clears the cached value and forgets the current record.
    ///
    /// A computation already running under the forgotten record is not
    /// cancelled and may still publish its result when it finishes.
    pub(crate) fn reset(&self) {
        let mut snapshot = self.snapshot.write();
        let mut slot = self.slot.lock();
        snapshot.clear();
        *slot = None;
        self.stats.record_reset();
        debug!("Cache reset");
    }
}

impl<V: Clone, E, R: Record<V, E>> Coalescer<V, E, R> {
    /// Fast path: the cached value if it is still valid.
    pub(crate) fn lookup(&self) -> Option<V> {
        let value = self.peek();
        if value.is_some() {
            self.stats.hit();
            trace!("Cache hit");
        }
        value
    }

    /// Same as [`lookup`](Self::lookup) without counting a hit.
    pub(crate) fn peek(&self) -> Option<V> {
        let now = self.clock.now();
        self.snapshot.read().fresh(now).cloned()
    }

    /// Slow path: join the current record or publish a new one.
    pub(crate) fn elect(&self, ttl: Duration) -> Role<R> {
        let mut slot = self.slot.lock();
        let now = self.clock.now();

        if let Some(flight) = slot.as_ref() {
            if now < flight.deadline() {
                trace!("Joining computation in flight");
                return Role::Follower(flight.clone());
            }
        }

        let flight = Arc::new(R::start(deadline_after(now, ttl)));
        *slot = Some(flight.clone());
        self.stats.leader();
        debug!(ttl_ms = ttl.as_millis() as u64, "Starting computation");
        Role::Leader(flight)
    }

    /// Applies a finished computation's outcome to the shared state.
    ///
    /// A success goes through the ratchet. A failure is never cached: the
    /// record is dropped from the slot so the next caller starts over, while
    /// followers already holding it still receive the error.
    pub(crate) fn settle(&self, flight: &Arc<R>, outcome: &Result<V, E>) {
        match outcome {
            Ok(value) => self.publish(flight.deadline(), value.clone()),
            Err(_) => {
                self.stats.failure();
                self.forget(flight);
                debug!("Computation failed, result not cached");
            }
        }
    }

    /// Whether a computation is running and new callers would join it.
    pub(crate) fn is_in_flight(&self) -> bool {
        let now = self.clock.now();
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|flight| now < flight.deadline() && flight.is_pending())
    }

    fn publish(&self, deadline: Instant, value: V) {
        let mut snapshot = self.snapshot.write();
        if snapshot.ratchet(deadline, value) {
            trace!("Published computed value");
        } else {
            self.stats.rejected_publish();
            debug!("Computed value superseded by a later deadline, not published");
        }
    }

    /// Removes `flight` from the slot if it is still the current record.
    fn forget(&self, flight: &Arc<R>) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, flight)) {
            *slot = None;
        }
    }
}

/// Held by a leader while its computation runs.
///
/// If the leader unwinds or its future is dropped before [`finish`]
/// completes the record, the record is abandoned: it is removed from the slot and its
/// followers are woken so one of them can take over.
///
/// [`finish`]: LeaderGuard::finish
pub(crate) struct LeaderGuard<'a, V: Clone, E: Clone, R: Record<V, E>> {
    coalescer: &'a Coalescer<V, E, R>,
    flight: Arc<R>,
    finished: bool,
}

impl<'a, V: Clone, E: Clone, R: Record<V, E>> LeaderGuard<'a, V, E, R> {
    pub(crate) fn new(coalescer: &'a Coalescer<V, E, R>, flight: Arc<R>) -> Self {
        Self {
            coalescer,
            flight,
            finished: false,
        }
    }

    /// Settles the outcome, completes the record and returns the outcome.
    pub(crate) fn finish(mut self, outcome: Result<V, E>) -> Result<V, E> {
        self.coalescer.settle(&self.flight, &outcome);
        self.flight.complete(outcome.clone());
        self.finished = true;
        outcome
    }
}

impl<V: Clone, E: Clone, R: Record<V, E>> Drop for LeaderGuard<'_, V, E, R> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.coalescer.forget(&self.flight);
        self.flight.abandon();
        self.coalescer.stats.abandoned();
        warn!("Computation abandoned before completing");
    }
}
