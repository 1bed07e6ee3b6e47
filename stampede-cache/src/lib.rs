//! # Stampede Cache
//!
//! A single-entry TTL cache that also deduplicates concurrent computations.
//!
//! While a cached value is valid it is returned without recomputation. Once
//! it expires, the first caller becomes the *leader* and runs the
//! computation; every caller that arrives before the leader's deadline waits
//! for and shares that one outcome instead of starting its own.
//!
//! Two front-ends share the same bookkeeping:
//!
//! - [`CoalescingCache`]: blocking, followers park the calling thread
//! - [`AsyncCoalescingCache`]: async, followers suspend their task
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use stampede_cache::CoalescingCache;
//!
//! let cache: CoalescingCache<String, String> = CoalescingCache::new();
//!
//! let first = cache.execute(Duration::from_secs(1), || Ok("fresh".to_string()));
//! let second = cache.execute(Duration::from_secs(1), || Ok("unused".to_string()));
//!
//! assert_eq!(first.unwrap(), "fresh");
//! assert_eq!(second.unwrap(), "fresh");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

mod async_cache;
mod cache;
mod coalescer;
mod flight;
mod snapshot;
mod stats;

pub use async_cache::AsyncCoalescingCache;
pub use cache::CoalescingCache;
pub use stats::CacheStats;

pub use stampede_core::{CacheConfig, Clock, ManualClock, SharedClock, SystemClock};
