//! Defaults and limits for Stampede caches.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// TTL
// ═══════════════════════════════════════════════════════════════════════════════

/// Default validity window for a freshly computed value, in milliseconds.
pub const DEFAULT_TTL_MS: u64 = 1_000;

/// Longest TTL a cache will honour (30 days).
///
/// Larger values are clamped when computing deadlines so that
/// `now + ttl` can never overflow an `Instant`.
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Environment variable overriding [`DEFAULT_TTL_MS`].
pub const ENV_DEFAULT_TTL_MS: &str = "STAMPEDE_DEFAULT_TTL_MS";
