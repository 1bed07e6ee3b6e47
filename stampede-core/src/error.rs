//! Error types for Stampede.
//!
//! The caches themselves never produce errors of their own: whatever the
//! wrapped computation returns is handed back verbatim. This type covers the
//! layers around them (configuration, tooling, simulated upstreams).

use thiserror::Error;

/// Result type alias using `StampedeError`.
pub type Result<T> = std::result::Result<T, StampedeError>;

/// Main error type for Stampede configuration and tooling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StampedeError {
    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// A configuration value is out of range or malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An environment variable could not be parsed.
    #[error("Invalid value for {name}: {reason}")]
    InvalidEnv {
        /// Variable name
        name: String,
        /// Why the value was rejected
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // UPSTREAM ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The wrapped upstream computation failed.
    #[error("Upstream call #{call} failed: {reason}")]
    Upstream {
        /// 1-based sequence number of the failed call
        call: u64,
        /// Failure description
        reason: String,
    },
}

impl StampedeError {
    /// Returns true if a caller may reasonably retry the operation.
    ///
    /// The caches never retry on their own; this is a hint for callers.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StampedeError::Upstream { .. })
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            StampedeError::InvalidConfig(_) | StampedeError::InvalidEnv { .. }
        )
    }
}
