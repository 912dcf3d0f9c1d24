//! Filter polyfill configuration.

use serde::{Deserialize, Serialize};
use shared_types::ConfigError;
use std::time::Duration;

/// Timing knobs for [`crate::FilterPolyfill`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Inactivity after which a filter is dropped
    pub filter_timeout_ms: u64,
    /// Minimum spacing of `eth_blockNumber` calls
    pub block_height_throttle_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_timeout_ms: 5 * 60 * 1000,
            block_height_throttle_ms: 1000,
        }
    }
}

impl FilterConfig {
    pub fn filter_timeout(&self) -> Duration {
        Duration::from_millis(self.filter_timeout_ms)
    }

    pub fn block_height_throttle(&self) -> Duration {
        Duration::from_millis(self.block_height_throttle_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter_timeout_ms == 0 {
            return Err(ConfigError::InvalidDuration {
                field: "filter_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
