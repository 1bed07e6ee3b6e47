//! Last known good value and its expiry.

use std::time::{Duration, Instant};

use stampede_core::MAX_TTL;

/// Cached value with the instant it stops being valid.
///
/// `expires_at` is `None` for a fresh or reset cache; any deadline beats it.
#[derive(Debug)]
pub(crate) struct Snapshot<V> {
    value: Option<V>,
    expires_at: Option<Instant>,
}

impl<V> Snapshot<V> {
    pub(crate) fn empty() -> Self {
        Self {
            value: None,
            expires_at: None,
        }
    }

    /// Returns the value if `now` is strictly before its expiry.
    pub(crate) fn fresh(&self, now: Instant) -> Option<&V> {
        match (&self.value, self.expires_at) {
            (Some(value), Some(expires_at)) if now < expires_at => Some(value),
            _ => None,
        }
    }

    /// Stores `value` only if `deadline` is later than the current expiry.
    ///
    /// Returns whether the value was stored.
    pub(crate) fn ratchet(&mut self, deadline: Instant, value: V) -> bool {
        if self.expires_at.is_some_and(|current| deadline <= current) {
            return false;
        }
        self.value = Some(value);
        self.expires_at = Some(deadline);
        true
    }

    pub(crate) fn clear(&mut self) {
        self.value = None;
        self.expires_at = None;
    }
}

/// Computes `now + ttl`, clamping `ttl` to [`MAX_TTL`].
pub(crate) fn deadline_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now)
}
