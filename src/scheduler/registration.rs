//! Registration records: per-id mutable polling state, outcome accounting,
//! and read-only snapshots for the rendering layer.

use crate::config::{PollingConfig, PollingConfigPatch};
use crate::constants::MAX_BACKOFF_MULTIPLIER;
use crate::error::PollFailure;
use crate::scheduler::source::PollSource;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, MutexGuard};

/// Mutable per-registration state. Mutated only by the scheduler, at
/// execution completion; there is a single in-flight execution per id, so
/// fields like `backoff_multiplier` never change concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingState {
    /// Derived from `enabled` in the config.
    pub active: bool,
    pub last_execution: Option<DateTime<Utc>>,
    /// Lifetime failure count.
    pub error_count: u64,
    /// Resets to 0 on success.
    pub consecutive_errors: u32,
    /// >= 1; doubles on failure up to a cap, resets to 1 on success.
    pub backoff_multiplier: u32,
    pub circuit_breaker_open: bool,
    pub using_cached_data: bool,
    pub last_error: Option<String>,
}

impl PollingState {
    fn new(active: bool) -> Self {
        Self {
            active,
            last_execution: None,
            error_count: 0,
            consecutive_errors: 0,
            backoff_multiplier: 1,
            circuit_breaker_open: false,
            using_cached_data: false,
            last_error: None,
        }
    }
}

/// Error counters exposed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub error_count: u64,
    pub consecutive_errors: u32,
    pub circuit_breaker_open: bool,
    pub last_error: Option<String>,
    pub using_cached_data: bool,
}

/// Read-only view of one registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationSnapshot {
    pub id: String,
    pub config: PollingConfig,
    pub state: PollingState,
    pub data: Option<Value>,
    pub paused: bool,
}

pub(crate) struct SuccessOutcome {
    /// True when this success ends a streak of one or more failures.
    pub ended_error_streak: bool,
}

pub(crate) struct FailureOutcome {
    /// True exactly on the failure that latches the breaker open.
    pub opened_breaker: bool,
    pub consecutive_errors: u32,
}

/// One registered polling operation: callback, config, state, and the
/// control signals its schedule loop waits on.
pub(crate) struct RegistrationInner {
    id: String,
    source: Arc<dyn PollSource>,
    config: RwLock<PollingConfig>,
    state: RwLock<PollingState>,
    data: RwLock<Option<Value>>,
    paused: AtomicBool,
    /// Version counter bumped on any control-relevant mutation; the schedule
    /// loop watches it so pauses/resumes/config changes take effect without
    /// polling.
    control: watch::Sender<u64>,
    /// Serializes timer ticks with forced refreshes for this id.
    execution_lock: Mutex<()>,
}

impl RegistrationInner {
    pub(crate) fn new(id: String, source: Arc<dyn PollSource>, config: PollingConfig) -> Self {
        let active = config.enabled;
        let (control, _) = watch::channel(0);
        Self {
            id,
            source,
            config: RwLock::new(config),
            state: RwLock::new(PollingState::new(active)),
            data: RwLock::new(None),
            paused: AtomicBool::new(false),
            control,
            execution_lock: Mutex::new(()),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn config(&self) -> PollingConfig {
        self.config.read().clone()
    }

    pub(crate) async fn poll(&self) -> Result<Value, PollFailure> {
        self.source.poll().await
    }

    pub(crate) async fn execution_guard(&self) -> MutexGuard<'_, ()> {
        self.execution_lock.lock().await
    }

    pub(crate) fn watch_control(&self) -> watch::Receiver<u64> {
        self.control.subscribe()
    }

    fn touch(&self) {
        self.control.send_modify(|version| *version += 1);
    }

    /// Delay before the next tick: `interval * backoff_multiplier`. The
    /// multiplier is 1 unless exponential backoff has grown it.
    pub(crate) fn next_delay(&self) -> Duration {
        let interval = self.config.read().interval;
        let multiplier = self.state.read().backoff_multiplier;
        interval * multiplier
    }

    /// Whether a tick may execute right now, given the current visibility
    /// and global-suspension signals.
    pub(crate) fn is_runnable(&self, visible: bool, suspended: bool) -> bool {
        if self.paused.load(Ordering::Acquire) || suspended {
            return false;
        }
        let config = self.config.read();
        if !config.enabled {
            return false;
        }
        if config.pause_on_hidden && !visible {
            return false;
        }
        !self.state.read().circuit_breaker_open
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
        self.touch();
    }

    pub(crate) fn record_success(&self) -> SuccessOutcome {
        let mut state = self.state.write();
        let ended_error_streak = state.consecutive_errors > 0;
        state.last_execution = Some(Utc::now());
        state.consecutive_errors = 0;
        state.backoff_multiplier = 1;
        state.circuit_breaker_open = false;
        state.using_cached_data = false;
        state.last_error = None;
        SuccessOutcome { ended_error_streak }
    }

    pub(crate) fn record_failure(&self, failure: &PollFailure) -> FailureOutcome {
        let config = self.config.read();
        let mut state = self.state.write();
        state.last_execution = Some(Utc::now());
        state.error_count += 1;
        state.consecutive_errors += 1;
        state.last_error = Some(failure.to_string());
        if config.exponential_backoff {
            state.backoff_multiplier = state
                .backoff_multiplier
                .saturating_mul(2)
                .min(MAX_BACKOFF_MULTIPLIER);
        }
        let opened_breaker = !state.circuit_breaker_open
            && state.consecutive_errors >= config.circuit_breaker_threshold;
        if opened_breaker {
            state.circuit_breaker_open = true;
        }
        FailureOutcome {
            opened_breaker,
            consecutive_errors: state.consecutive_errors,
        }
    }

    pub(crate) fn set_data(&self, payload: Value) {
        *self.data.write() = Some(payload);
    }

    /// Surface a cached payload as current data after a failed execution.
    pub(crate) fn set_cached_data(&self, payload: Value) {
        *self.data.write() = Some(payload);
        self.state.write().using_cached_data = true;
    }

    /// Apply a typed patch, returning the fully resolved config. Any config
    /// change conservatively resets the circuit breaker so the registration
    /// can recover under the new policy.
    pub(crate) fn apply_patch(&self, patch: &PollingConfigPatch) -> PollingConfig {
        let resolved = patch.apply_to(&self.config.read());
        *self.config.write() = resolved.clone();
        let mut state = self.state.write();
        state.active = resolved.enabled;
        state.circuit_breaker_open = false;
        state.consecutive_errors = 0;
        drop(state);
        self.touch();
        resolved
    }

    /// Clear the breaker and its counters. The schedule stays paused until
    /// explicitly re-armed with `resume` or a successful forced refresh.
    pub(crate) fn reset_circuit_breaker(&self) {
        let mut state = self.state.write();
        state.circuit_breaker_open = false;
        state.consecutive_errors = 0;
        state.backoff_multiplier = 1;
        drop(state);
        self.paused.store(true, Ordering::Release);
        self.touch();
    }

    pub(crate) fn snapshot(&self) -> RegistrationSnapshot {
        RegistrationSnapshot {
            id: self.id.clone(),
            config: self.config.read().clone(),
            state: self.state.read().clone(),
            data: self.data.read().clone(),
            paused: self.is_paused(),
        }
    }

    pub(crate) fn error_stats(&self) -> ErrorStats {
        let state = self.state.read();
        ErrorStats {
            error_count: state.error_count,
            consecutive_errors: state.consecutive_errors,
            circuit_breaker_open: state.circuit_breaker_open,
            last_error: state.last_error.clone(),
            using_cached_data: state.using_cached_data,
        }
    }
}

impl std::fmt::Debug for RegistrationInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationInner")
            .field("id", &self.id)
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::source::FnSource;
    use serde_json::json;

    fn registration(config: PollingConfig) -> RegistrationInner {
        let source = Arc::new(FnSource::new(|| async { Ok(json!(1)) }));
        RegistrationInner::new("quests".to_string(), source, config)
    }

    fn failure() -> PollFailure {
        PollFailure::application("boom")
    }

    #[test]
    fn test_backoff_multiplier_doubles_and_caps() {
        let reg = registration(PollingConfig {
            circuit_breaker_threshold: 100,
            ..Default::default()
        });

        let mut expected = 1u32;
        for _ in 0..10 {
            reg.record_failure(&failure());
            expected = (expected * 2).min(MAX_BACKOFF_MULTIPLIER);
            assert_eq!(reg.snapshot().state.backoff_multiplier, expected);
        }
        assert_eq!(reg.snapshot().state.backoff_multiplier, MAX_BACKOFF_MULTIPLIER);
    }

    #[test]
    fn test_success_resets_error_streak() {
        let reg = registration(PollingConfig::default());
        reg.record_failure(&failure());
        reg.record_failure(&failure());

        let outcome = reg.record_success();
        assert!(outcome.ended_error_streak);

        let state = reg.snapshot().state;
        assert_eq!(state.consecutive_errors, 0);
        assert_eq!(state.backoff_multiplier, 1);
        assert_eq!(state.error_count, 2);
        assert!(state.last_error.is_none());

        // A success without a preceding failure is not a recovery.
        assert!(!reg.record_success().ended_error_streak);
    }

    #[test]
    fn test_breaker_opens_exactly_at_threshold() {
        let reg = registration(PollingConfig {
            circuit_breaker_threshold: 3,
            ..Default::default()
        });

        assert!(!reg.record_failure(&failure()).opened_breaker);
        assert!(!reg.record_failure(&failure()).opened_breaker);
        let outcome = reg.record_failure(&failure());
        assert!(outcome.opened_breaker);
        assert_eq!(outcome.consecutive_errors, 3);

        // Already open: no second transition.
        assert!(!reg.record_failure(&failure()).opened_breaker);
        assert!(reg.snapshot().state.circuit_breaker_open);
    }

    #[test]
    fn test_breaker_invariant_holds() {
        let threshold = 4;
        let reg = registration(PollingConfig {
            circuit_breaker_threshold: threshold,
            ..Default::default()
        });
        for _ in 0..threshold {
            reg.record_failure(&failure());
        }
        let state = reg.snapshot().state;
        assert!(state.circuit_breaker_open);
        assert!(state.consecutive_errors >= threshold);
    }

    #[test]
    fn test_next_delay_tracks_multiplier() {
        let config = PollingConfig::default();
        let interval = config.interval;
        let reg = registration(config);

        assert_eq!(reg.next_delay(), interval);
        reg.record_failure(&failure());
        assert_eq!(reg.next_delay(), interval * 2);
        reg.record_failure(&failure());
        assert_eq!(reg.next_delay(), interval * 4);
        reg.record_success();
        assert_eq!(reg.next_delay(), interval);
    }

    #[test]
    fn test_patch_resets_breaker() {
        let reg = registration(PollingConfig {
            circuit_breaker_threshold: 1,
            ..Default::default()
        });
        reg.record_failure(&failure());
        assert!(reg.snapshot().state.circuit_breaker_open);

        let resolved = reg.apply_patch(&PollingConfigPatch::default().circuit_breaker_threshold(10));
        assert_eq!(resolved.circuit_breaker_threshold, 10);

        let state = reg.snapshot().state;
        assert!(!state.circuit_breaker_open);
        assert_eq!(state.consecutive_errors, 0);
    }

    #[test]
    fn test_reset_leaves_schedule_paused() {
        let reg = registration(PollingConfig {
            circuit_breaker_threshold: 1,
            ..Default::default()
        });
        reg.record_failure(&failure());

        reg.reset_circuit_breaker();
        let snapshot = reg.snapshot();
        assert!(!snapshot.state.circuit_breaker_open);
        assert_eq!(snapshot.state.consecutive_errors, 0);
        assert!(snapshot.paused);
        assert!(!reg.is_runnable(true, false));
    }

    #[test]
    fn test_runnable_gates() {
        let reg = registration(PollingConfig::default());
        assert!(reg.is_runnable(true, false));

        // Hidden surface suspends registrations that opt in.
        assert!(!reg.is_runnable(false, false));
        // Global suspension wins.
        assert!(!reg.is_runnable(true, true));

        reg.set_paused(true);
        assert!(!reg.is_runnable(true, false));
        reg.set_paused(false);

        let resolved = reg.apply_patch(&PollingConfigPatch::default().enabled(false));
        assert!(!resolved.enabled);
        assert!(!reg.is_runnable(true, false));
    }

    #[test]
    fn test_hidden_surface_allowed_when_opted_out() {
        let reg = registration(PollingConfig {
            pause_on_hidden: false,
            ..Default::default()
        });
        assert!(reg.is_runnable(false, false));
    }
}
