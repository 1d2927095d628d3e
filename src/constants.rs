//! # System Constants
//!
//! Named bounds and defaults that define the operational envelope of the
//! polling core. Configuration values outside these bounds are corrected by
//! clamping rather than rejected: this is a resilience layer and must not
//! itself be brittle.

use std::time::Duration;

/// Lower bound for a polling interval. Anything tighter hammers the backend
/// for no user-visible benefit.
pub const MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound for a polling interval (10 minutes).
pub const MAX_INTERVAL: Duration = Duration::from_secs(600);

/// Interval used when a registration does not specify one.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Consecutive-failure count at which the circuit breaker opens.
pub const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 5;

/// Bounds for the circuit breaker threshold. A threshold of zero would latch
/// the breaker before the first attempt; anything past 100 never trips in
/// practice.
pub const MIN_CIRCUIT_BREAKER_THRESHOLD: u32 = 1;
pub const MAX_CIRCUIT_BREAKER_THRESHOLD: u32 = 100;

/// Exponential backoff multiplier cap. Doubling stops here, so the slowest
/// retry cadence is `interval * 32`.
pub const MAX_BACKOFF_MULTIPLIER: u32 = 32;

/// Bounds and default for cache entry time-to-live.
pub const MIN_CACHE_TTL: Duration = Duration::from_secs(1);
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Age past which cached data is flagged as stale. Advisory only: stale
/// entries are still served, flagged for the UI.
pub const DEFAULT_CACHE_FRESHNESS: Duration = Duration::from_secs(60);

/// Capacity of the alert broadcast channel.
pub const DEFAULT_ALERT_CAPACITY: usize = 256;

/// Scheduler lifecycle events attached to structured log records.
pub mod events {
    pub const REGISTRATION_CREATED: &str = "polling.registration_created";
    pub const REGISTRATION_REMOVED: &str = "polling.registration_removed";
    pub const EXECUTION_SUCCEEDED: &str = "polling.execution_succeeded";
    pub const EXECUTION_FAILED: &str = "polling.execution_failed";
    pub const CIRCUIT_BREAKER_OPENED: &str = "polling.circuit_breaker_opened";
    pub const CIRCUIT_BREAKER_RESET: &str = "polling.circuit_breaker_reset";
    pub const RECOVERY: &str = "polling.recovery";
    pub const SCHEDULE_PAUSED: &str = "polling.schedule_paused";
    pub const SCHEDULE_RESUMED: &str = "polling.schedule_resumed";
    pub const VISIBILITY_CHANGED: &str = "polling.visibility_changed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_bounds_are_ordered() {
        assert!(MIN_INTERVAL < DEFAULT_INTERVAL);
        assert!(DEFAULT_INTERVAL < MAX_INTERVAL);
    }

    #[test]
    fn test_threshold_bounds_contain_default() {
        assert!(MIN_CIRCUIT_BREAKER_THRESHOLD <= DEFAULT_CIRCUIT_BREAKER_THRESHOLD);
        assert!(DEFAULT_CIRCUIT_BREAKER_THRESHOLD <= MAX_CIRCUIT_BREAKER_THRESHOLD);
    }

    #[test]
    fn test_cache_ttl_bounds_contain_default() {
        assert!(MIN_CACHE_TTL <= DEFAULT_CACHE_TTL);
        assert!(DEFAULT_CACHE_TTL <= MAX_CACHE_TTL);
    }
}
