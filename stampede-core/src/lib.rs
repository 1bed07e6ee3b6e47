//! # Stampede Core
//!
//! Foundational pieces shared by the Stampede crates:
//!
//! - **Errors**: the ambient error type used by configuration and tooling
//! - **Clock**: the injectable time source every cache reads "now" from
//! - **Config**: serializable cache configuration with environment loading
//! - **Constants**: defaults and limits
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use stampede_core::{CacheConfig, Clock, ManualClock};
//!
//! let clock = ManualClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_millis(250));
//! assert_eq!(clock.now() - start, Duration::from_millis(250));
//!
//! let config = CacheConfig::default();
//! assert!(config.validate().is_ok());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod constants;
pub mod error;
pub mod traits;

// Re-export commonly used items at crate root
pub use config::CacheConfig;
pub use constants::*;
pub use error::{Result, StampedeError};
pub use traits::{Clock, ManualClock, SharedClock, SystemClock};
