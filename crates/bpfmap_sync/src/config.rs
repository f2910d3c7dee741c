//! Reconciliation tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Consecutive failed operations after which a map is marked failed.
pub const MAX_SYNC_ERRORS: u32 = 512;

/// Minimum time between the starts of two passes on the same map.
pub const ERROR_RESOLVER_MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Delay between the first request and the pass it schedules.
pub const ERROR_RESOLVER_DELAY: Duration = Duration::from_millis(200);

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("min_interval must be non-zero")]
    ZeroInterval,
    #[error("max_sync_errors must be non-zero")]
    ZeroErrorCeiling,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Wait after the first request so bursts land in one pass
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Minimum spacing between pass starts
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,
    /// Error ceiling; exceeding it marks the map failed
    pub max_sync_errors: u32,
    /// Preallocate kinds that permit but don't require it
    pub preallocate_maps: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay: ERROR_RESOLVER_DELAY,
            min_interval: ERROR_RESOLVER_MIN_INTERVAL,
            max_sync_errors: MAX_SYNC_ERRORS,
            preallocate_maps: true,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.max_sync_errors == 0 {
            return Err(ConfigError::ZeroErrorCeiling);
        }
        Ok(())
    }
}
