//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_TTL_MS, ENV_DEFAULT_TTL_MS, MAX_TTL};
use crate::error::{Result, StampedeError};

/// Cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL used by `execute_default`, in milliseconds
    pub default_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

impl CacheConfig {
    /// Creates a config with the given default TTL.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            default_ttl_ms: ttl.as_millis().min(u64::MAX as u128) as u64,
        }
    }

    /// Loads the config from the environment (and a `.env` file if present).
    ///
    /// Unset variables fall back to defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ENV_DEFAULT_TTL_MS) {
            config.default_ttl_ms =
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| StampedeError::InvalidEnv {
                        name: ENV_DEFAULT_TTL_MS.into(),
                        reason: e.to_string(),
                    })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Returns the default TTL as a [`Duration`].
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Checks that all values are within supported limits.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl() > MAX_TTL {
            return Err(StampedeError::InvalidConfig(format!(
                "default_ttl_ms {} exceeds maximum of {}ms",
                self.default_ttl_ms,
                MAX_TTL.as_millis()
            )));
        }
        Ok(())
    }
}
