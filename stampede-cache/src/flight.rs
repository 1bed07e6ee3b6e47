//! In-flight call records.
//!
//! A record is created by the leader of a cache miss and shared with every
//! follower that arrives before its deadline. Its state moves from
//! `Pending` to a terminal state exactly once and is never reset.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// Progress of one computation.
#[derive(Debug)]
pub(crate) enum FlightState<V, E> {
    Pending,
    Done(Result<V, E>),
    /// The leader panicked or was cancelled before producing an outcome.
    Abandoned,
}

impl<V, E> FlightState<V, E> {
    pub(crate) fn is_pending(&self) -> bool {
        matches!(self, FlightState::Pending)
    }
}

impl<V: Clone, E: Clone> FlightState<V, E> {
    /// Outcome of a finished flight; `None` if it was abandoned or is still pending.
    pub(crate) fn outcome(&self) -> Option<Result<V, E>> {
        match self {
            FlightState::Done(outcome) => Some(outcome.clone()),
            FlightState::Pending | FlightState::Abandoned => None,
        }
    }
}

/// What the coalescer needs from a record, independent of how followers wait.
pub(crate) trait Record<V, E>: Send + Sync {
    fn start(deadline: Instant) -> Self;

    fn deadline(&self) -> Instant;

    fn is_pending(&self) -> bool;

    /// Stores the outcome and wakes every follower. Later calls are ignored.
    fn complete(&self, outcome: Result<V, E>);

    /// Moves a pending record to `Abandoned` and wakes its followers.
    fn abandon(&self);
}

/// Record whose followers block their thread on a condition variable.
#[derive(Debug)]
pub(crate) struct Flight<V, E> {
    deadline: Instant,
    state: Mutex<FlightState<V, E>>,
    done: Condvar,
}

impl<V: Clone, E: Clone> Flight<V, E> {
    /// Blocks until the flight finishes.
    ///
    /// Returns `None` if the leader abandoned it.
    pub(crate) fn wait(&self) -> Option<Result<V, E>> {
        let mut state = self.state.lock();
        while state.is_pending() {
            self.done.wait(&mut state);
        }
        state.outcome()
    }
}

impl<V: Send, E: Send> Record<V, E> for Flight<V, E> {
    fn start(deadline: Instant) -> Self {
        Self {
            deadline,
            state: Mutex::new(FlightState::Pending),
            done: Condvar::new(),
        }
    }

    fn deadline(&self) -> Instant {
        self.deadline
    }

    fn is_pending(&self) -> bool {
        self.state.lock().is_pending()
    }

    fn complete(&self, outcome: Result<V, E>) {
        let mut state = self.state.lock();
        if state.is_pending() {
            *state = FlightState::Done(outcome);
        }
        drop(state);
        self.done.notify_all();
    }

    fn abandon(&self) {
        let mut state = self.state.lock();
        if state.is_pending() {
            *state = FlightState::Abandoned;
        }
        drop(state);
        self.done.notify_all();
    }
}
