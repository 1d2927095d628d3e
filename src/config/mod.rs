//! # Polling Configuration
//!
//! Typed configuration for individual registrations plus scheduler-wide
//! settings.
//!
//! ## Architecture
//!
//! - **Per-registration**: [`PollingConfig`] is immutable for the lifetime of
//!   a registration and only replaceable through a [`PollingConfigPatch`],
//!   applied field-by-field with explicit clamping. There is no duck-typed
//!   merge: every field change is validated and the fully resolved config is
//!   returned.
//! - **Scheduler-wide**: [`SchedulerSettings`] covers the shared stores
//!   (alert channel capacity, cache freshness window) and loads from the
//!   environment with a `POLLING_` prefix.
//!
//! Invalid values are corrected silently by clamping, never raised: the
//! resilience layer must not itself be brittle.

use crate::constants::{
    DEFAULT_ALERT_CAPACITY, DEFAULT_CACHE_FRESHNESS, DEFAULT_CACHE_TTL,
    DEFAULT_CIRCUIT_BREAKER_THRESHOLD, DEFAULT_INTERVAL, MAX_CACHE_TTL,
    MAX_CIRCUIT_BREAKER_THRESHOLD, MAX_INTERVAL, MIN_CACHE_TTL, MIN_CIRCUIT_BREAKER_THRESHOLD,
    MIN_INTERVAL,
};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Per-registration polling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between the end of one execution and the start of the next.
    pub interval: Duration,

    /// When false the schedule is stopped and the callback is never invoked.
    pub enabled: bool,

    /// Double the retry delay after each consecutive failure.
    pub exponential_backoff: bool,

    /// Consecutive failures at which the circuit breaker opens.
    pub circuit_breaker_threshold: u32,

    /// Store successful payloads for graceful degradation.
    pub enable_caching: bool,

    /// Hard time-to-live for cached payloads.
    pub cache_ttl: Duration,

    /// Fall back to the last cached payload when an execution fails.
    pub graceful_degradation: bool,

    /// Emit operator alerts on failure and recovery.
    pub enable_alerts: bool,

    /// Suspend this registration while the hosting surface is hidden.
    pub pause_on_hidden: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            enabled: true,
            exponential_backoff: true,
            circuit_breaker_threshold: DEFAULT_CIRCUIT_BREAKER_THRESHOLD,
            enable_caching: true,
            cache_ttl: DEFAULT_CACHE_TTL,
            graceful_degradation: true,
            enable_alerts: true,
            pause_on_hidden: true,
        }
    }
}

impl PollingConfig {
    /// Return a copy with every bounded field forced into its valid range.
    ///
    /// Called on registration and after each patch application, so the
    /// scheduler only ever observes in-range values.
    pub fn clamped(mut self) -> Self {
        self.interval = clamp_duration("interval", self.interval, MIN_INTERVAL, MAX_INTERVAL);
        self.cache_ttl = clamp_duration("cache_ttl", self.cache_ttl, MIN_CACHE_TTL, MAX_CACHE_TTL);
        self.circuit_breaker_threshold = clamp_u32(
            "circuit_breaker_threshold",
            self.circuit_breaker_threshold,
            MIN_CIRCUIT_BREAKER_THRESHOLD,
            MAX_CIRCUIT_BREAKER_THRESHOLD,
        );
        self
    }
}

fn clamp_duration(field: &str, value: Duration, min: Duration, max: Duration) -> Duration {
    let clamped = value.clamp(min, max);
    if clamped != value {
        debug!(
            field = field,
            requested_ms = value.as_millis() as u64,
            applied_ms = clamped.as_millis() as u64,
            "Configuration value clamped to valid range"
        );
    }
    clamped
}

fn clamp_u32(field: &str, value: u32, min: u32, max: u32) -> u32 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        debug!(
            field = field,
            requested = value,
            applied = clamped,
            "Configuration value clamped to valid range"
        );
    }
    clamped
}

/// Partial update for a [`PollingConfig`].
///
/// Every field is optional; absent fields keep their current value. The
/// patch is applied field-by-field and the result is re-clamped, so a patch
/// can never push a registration outside the valid envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollingConfigPatch {
    pub interval: Option<Duration>,
    pub enabled: Option<bool>,
    pub exponential_backoff: Option<bool>,
    pub circuit_breaker_threshold: Option<u32>,
    pub enable_caching: Option<bool>,
    pub cache_ttl: Option<Duration>,
    pub graceful_degradation: Option<bool>,
    pub enable_alerts: Option<bool>,
    pub pause_on_hidden: Option<bool>,
}

impl PollingConfigPatch {
    /// Apply this patch to `current`, returning the fully resolved config.
    pub fn apply_to(&self, current: &PollingConfig) -> PollingConfig {
        PollingConfig {
            interval: self.interval.unwrap_or(current.interval),
            enabled: self.enabled.unwrap_or(current.enabled),
            exponential_backoff: self
                .exponential_backoff
                .unwrap_or(current.exponential_backoff),
            circuit_breaker_threshold: self
                .circuit_breaker_threshold
                .unwrap_or(current.circuit_breaker_threshold),
            enable_caching: self.enable_caching.unwrap_or(current.enable_caching),
            cache_ttl: self.cache_ttl.unwrap_or(current.cache_ttl),
            graceful_degradation: self
                .graceful_degradation
                .unwrap_or(current.graceful_degradation),
            enable_alerts: self.enable_alerts.unwrap_or(current.enable_alerts),
            pause_on_hidden: self.pause_on_hidden.unwrap_or(current.pause_on_hidden),
        }
        .clamped()
    }

    /// Builder-style helpers for the common patch shapes.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_threshold = Some(threshold);
        self
    }
}

/// Scheduler-wide settings for the shared cache and alert stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Capacity of the alert broadcast channel.
    pub alert_capacity: usize,

    /// Cache age past which reads are flagged stale (advisory).
    pub cache_freshness_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            cache_freshness_seconds: DEFAULT_CACHE_FRESHNESS.as_secs(),
        }
    }
}

impl SchedulerSettings {
    /// Load settings from the environment (`POLLING_ALERT_CAPACITY`,
    /// `POLLING_CACHE_FRESHNESS_SECONDS`), falling back to defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let settings = config::Config::builder()
            .set_default("alert_capacity", defaults.alert_capacity as u64)?
            .set_default(
                "cache_freshness_seconds",
                defaults.cache_freshness_seconds,
            )?
            .add_source(config::Environment::with_prefix("POLLING"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn cache_freshness(&self) -> Duration {
        Duration::from_secs(self.cache_freshness_seconds)
    }
}
