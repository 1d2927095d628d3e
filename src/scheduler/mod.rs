//! # Registration Table & Scheduler
//!
//! Owns one schedule loop per registered polling operation, executes the
//! caller-supplied fetch callback, classifies outcomes, applies exponential
//! backoff and circuit breaking, and drives the shared cache and alert
//! stores.
//!
//! ## Concurrency model
//!
//! Cooperative and timer-driven: each registration runs one tokio task that
//! sleeps for the current delay, waits until the registration is runnable
//! (not paused, not suspended, enabled, breaker closed, visibility
//! permitting), then executes the callback and settles the outcome before
//! computing the next delay. Executions of the same id therefore never
//! overlap; a forced refresh serializes with the timer through the
//! registration's execution lock. Ticks of different registrations are
//! independent and unordered.
//!
//! ## Failure path
//!
//! A failed execution bumps the error counters, grows the backoff
//! multiplier, raises a classified alert, optionally surfaces the last
//! cached payload, and latches the circuit breaker once the consecutive
//! failure count reaches the configured threshold. While the breaker is
//! open the callback is never invoked; only `reset_circuit_breaker` or a
//! successful `force_refresh` exit the latched state.

mod handle;
mod registration;
mod source;

pub use registration::{ErrorStats, PollingState, RegistrationSnapshot};
pub use source::{FnSource, PollSource};

use crate::alerts::{AlertAction, AlertSink, PollingAlert};
use crate::cache::CacheStore;
use crate::config::{PollingConfig, PollingConfigPatch, SchedulerSettings};
use crate::constants::events;
use crate::error::PollFailure;
use crate::visibility::VisibilityGate;
use dashmap::DashMap;
use handle::ScheduleHandle;
use registration::RegistrationInner;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

struct RegistrationEntry {
    inner: Arc<RegistrationInner>,
    handle: ScheduleHandle,
}

/// Resilient polling scheduler.
///
/// A constructible object with an injected visibility source; independent
/// instances are fully isolated, so tests (and the application wiring
/// layer, which may hold a single shared instance) each build their own.
#[derive(Clone)]
pub struct PollingScheduler {
    core: Arc<SchedulerCore>,
}

pub(crate) struct SchedulerCore {
    registrations: DashMap<String, RegistrationEntry>,
    cache: Arc<CacheStore>,
    alerts: Arc<AlertSink>,
    gate: VisibilityGate,
    /// Global suspension flag driven by `pause_all`/`resume_all`.
    suspended: watch::Sender<bool>,
    self_weak: Weak<SchedulerCore>,
}

impl PollingScheduler {
    /// Scheduler with a private, always-visible gate.
    pub fn new(settings: SchedulerSettings) -> Self {
        Self::with_gate(settings, VisibilityGate::new())
    }

    /// Scheduler observing a host-driven visibility gate.
    pub fn with_gate(settings: SchedulerSettings, gate: VisibilityGate) -> Self {
        let cache = Arc::new(CacheStore::new(settings.cache_freshness()));
        let alerts = Arc::new(AlertSink::new(settings.alert_capacity));
        let (suspended, _) = watch::channel(false);
        let core = Arc::new_cyclic(|weak| SchedulerCore {
            registrations: DashMap::new(),
            cache,
            alerts,
            gate,
            suspended,
            self_weak: weak.clone(),
        });
        Self { core }
    }

    /// Register (or atomically replace) the polling operation for `id` and
    /// arm its schedule. Never fails: an empty id is ignored with a log.
    pub fn register(&self, id: impl Into<String>, source: Arc<dyn PollSource>, config: PollingConfig) {
        self.core.register(id.into(), source, config);
    }

    /// [`register`](Self::register) for a plain async closure.
    pub fn register_fn<F, Fut>(&self, id: impl Into<String>, fetch: F, config: PollingConfig)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, PollFailure>> + Send + 'static,
    {
        self.register(id, Arc::new(FnSource::new(fetch)), config);
    }

    /// Cancel the schedule, remove the registration, and clear its alerts
    /// and cache entry. Unregistering an unknown id is a no-op.
    pub fn unregister(&self, id: &str) {
        self.core.unregister(id);
    }

    /// Stop the timer for `id` without touching error counters or breaker
    /// state.
    pub fn pause(&self, id: &str) {
        self.core.set_paused(id, true);
    }

    pub fn resume(&self, id: &str) {
        self.core.set_paused(id, false);
    }

    /// Suspend every registered schedule. Reversible with
    /// [`resume_all`](Self::resume_all); individual pause state is
    /// preserved across the round trip.
    pub fn pause_all(&self) {
        self.core.suspended.send_replace(true);
        info!(event = events::SCHEDULE_PAUSED, scope = "all", "All schedules suspended");
    }

    pub fn resume_all(&self) {
        self.core.suspended.send_replace(false);
        info!(event = events::SCHEDULE_RESUMED, scope = "all", "All schedules resumed");
    }

    /// Apply a typed config patch, returning the fully resolved config, or
    /// `None` for an unknown id. Any change conservatively resets the
    /// circuit breaker.
    pub fn update_config(&self, id: &str, patch: &PollingConfigPatch) -> Option<PollingConfig> {
        self.core.update_config(id, patch)
    }

    /// Run the callback immediately, outside the normal schedule, still
    /// honoring the one-in-flight-execution rule. A success closes the
    /// circuit breaker and resumes normal scheduling; a failure leaves it
    /// latched. Returns whether the refresh succeeded.
    pub async fn force_refresh(&self, id: &str) -> bool {
        self.core.force_refresh(id).await
    }

    /// Clear the breaker and its counters, leaving the schedule paused
    /// until re-armed. Returns whether the id existed.
    pub fn reset_circuit_breaker(&self, id: &str) -> bool {
        self.core.reset_circuit_breaker(id)
    }

    pub fn get_registration(&self, id: &str) -> Option<RegistrationSnapshot> {
        self.core
            .registrations
            .get(id)
            .map(|entry| entry.inner.snapshot())
    }

    pub fn get_all_registrations(&self) -> Vec<RegistrationSnapshot> {
        self.core
            .registrations
            .iter()
            .map(|entry| entry.inner.snapshot())
            .collect()
    }

    pub fn get_error_stats(&self, id: &str) -> Option<ErrorStats> {
        self.core
            .registrations
            .get(id)
            .map(|entry| entry.inner.error_stats())
    }

    /// Last-known-good payload for `id`, if one is cached and within TTL.
    pub fn get_cached_data(&self, id: &str) -> Option<Value> {
        self.core.cache.get(id).map(|entry| entry.data)
    }

    pub fn is_page_visible(&self) -> bool {
        self.core.gate.is_visible()
    }

    /// The visibility gate; the host wires its foreground/background signal
    /// into this handle.
    pub fn visibility(&self) -> VisibilityGate {
        self.core.gate.clone()
    }

    /// Shared alert store (read, dismiss, subscribe).
    pub fn alerts(&self) -> Arc<AlertSink> {
        self.core.alerts.clone()
    }

    /// Shared cache store.
    pub fn cache(&self) -> Arc<CacheStore> {
        self.core.cache.clone()
    }

    /// Cancel every schedule and drop all registrations.
    pub fn shutdown(&self) {
        for entry in self.core.registrations.iter() {
            entry.handle.cancel();
        }
        self.core.registrations.clear();
        info!("Polling scheduler shut down");
    }
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new(SchedulerSettings::default())
    }
}

impl std::fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("registrations", &self.core.registrations.len())
            .field("visible", &self.core.gate.is_visible())
            .finish_non_exhaustive()
    }
}

impl SchedulerCore {
    fn register(&self, id: String, source: Arc<dyn PollSource>, config: PollingConfig) {
        if id.is_empty() {
            warn!("Ignoring polling registration with empty id");
            return;
        }
        let config = config.clamped();

        // Replace-by-id: the old schedule is cancelled before the new one
        // starts, so the two never overlap and no state carries over.
        if let Some((_, old)) = self.registrations.remove(&id) {
            old.handle.cancel();
            debug!(registration_id = %id, "Existing registration replaced");
        }

        let inner = Arc::new(RegistrationInner::new(id.clone(), source, config.clone()));
        let task = tokio::spawn(run_schedule(
            self.self_weak.clone(),
            inner.clone(),
            self.gate.subscribe(),
            self.suspended.subscribe(),
        ));
        self.registrations.insert(
            id.clone(),
            RegistrationEntry {
                inner,
                handle: ScheduleHandle::new(task),
            },
        );
        info!(
            event = events::REGISTRATION_CREATED,
            registration_id = %id,
            interval_ms = config.interval.as_millis() as u64,
            enabled = config.enabled,
            "Polling registration created"
        );
    }

    fn unregister(&self, id: &str) {
        if let Some((_, entry)) = self.registrations.remove(id) {
            entry.handle.cancel();
            self.alerts.clear_for_registration(id);
            self.cache.delete(id);
            info!(
                event = events::REGISTRATION_REMOVED,
                registration_id = %id,
                "Polling registration removed"
            );
        }
    }

    fn set_paused(&self, id: &str, paused: bool) {
        if let Some(entry) = self.registrations.get(id) {
            entry.inner.set_paused(paused);
            info!(
                event = if paused {
                    events::SCHEDULE_PAUSED
                } else {
                    events::SCHEDULE_RESUMED
                },
                registration_id = %id,
                "Schedule pause state changed"
            );
        }
    }

    fn update_config(&self, id: &str, patch: &PollingConfigPatch) -> Option<PollingConfig> {
        let entry = self.registrations.get(id)?;
        let resolved = entry.inner.apply_patch(patch);
        debug!(
            registration_id = %id,
            enabled = resolved.enabled,
            interval_ms = resolved.interval.as_millis() as u64,
            "Polling configuration updated"
        );
        Some(resolved)
    }

    fn reset_circuit_breaker(&self, id: &str) -> bool {
        let Some(entry) = self.registrations.get(id) else {
            return false;
        };
        entry.inner.reset_circuit_breaker();
        info!(
            event = events::CIRCUIT_BREAKER_RESET,
            registration_id = %id,
            "Circuit breaker reset; schedule stays paused until re-armed"
        );
        true
    }

    async fn force_refresh(&self, id: &str) -> bool {
        let Some(inner) = self
            .registrations
            .get(id)
            .map(|entry| entry.inner.clone())
        else {
            return false;
        };

        let guard = inner.execution_guard().await;
        let success = self.execute_cycle(&inner).await;
        drop(guard);

        if success {
            // Breaker (if open) was closed by the success path; re-arm the
            // schedule.
            inner.set_paused(false);
        }
        success
    }

    async fn execute_cycle(&self, reg: &Arc<RegistrationInner>) -> bool {
        match reg.poll().await {
            Ok(payload) => {
                self.complete_success(reg, payload);
                true
            }
            Err(failure) => {
                self.complete_failure(reg, &failure);
                false
            }
        }
    }

    fn complete_success(&self, reg: &RegistrationInner, payload: Value) {
        let outcome = reg.record_success();
        reg.set_data(payload.clone());

        let config = reg.config();
        if config.enable_caching {
            self.cache.set(reg.id(), payload, config.cache_ttl);
        }
        if outcome.ended_error_streak {
            // The recovery supersedes the alerts raised during the streak.
            self.alerts.clear_for_registration(reg.id());
            if config.enable_alerts {
                self.alerts.push(PollingAlert::recovery(reg.id()));
            }
            info!(
                event = events::RECOVERY,
                registration_id = %reg.id(),
                "Polling recovered after error streak"
            );
        }
        debug!(
            event = events::EXECUTION_SUCCEEDED,
            registration_id = %reg.id(),
            "Poll execution succeeded"
        );
    }

    fn complete_failure(&self, reg: &RegistrationInner, failure: &PollFailure) {
        let outcome = reg.record_failure(failure);
        let config = reg.config();
        warn!(
            event = events::EXECUTION_FAILED,
            registration_id = %reg.id(),
            consecutive_errors = outcome.consecutive_errors,
            error = %failure,
            "Poll execution failed"
        );

        if config.graceful_degradation && config.enable_caching {
            if let Some(entry) = self.cache.get(reg.id()) {
                reg.set_cached_data(entry.data);
                debug!(
                    registration_id = %reg.id(),
                    "Serving cached payload while polling is degraded"
                );
            }
        }

        if config.enable_alerts {
            let alert = if failure.is_connectivity() {
                PollingAlert::network_error(reg.id(), failure.to_string())
            } else {
                PollingAlert::polling_error(reg.id(), failure.to_string())
            };
            self.push_with_standard_actions(reg.id(), alert);
        }

        if outcome.opened_breaker {
            error!(
                event = events::CIRCUIT_BREAKER_OPENED,
                registration_id = %reg.id(),
                consecutive_errors = outcome.consecutive_errors,
                threshold = config.circuit_breaker_threshold,
                "Circuit breaker opened; polling halted"
            );
            let alert = PollingAlert::circuit_breaker(reg.id(), outcome.consecutive_errors);
            self.push_with_standard_actions(reg.id(), alert);
        }
    }

    /// Attach the standard operator actions: Retry (a forced refresh) and
    /// Clear (dismissal of this alert).
    fn push_with_standard_actions(&self, registration_id: &str, alert: PollingAlert) {
        let retry = {
            let core = self.self_weak.clone();
            let id = registration_id.to_string();
            AlertAction::new("Retry", move || {
                if let Some(core) = core.upgrade() {
                    let id = id.clone();
                    tokio::spawn(async move {
                        core.force_refresh(&id).await;
                    });
                }
            })
        };
        let clear = {
            let alerts = Arc::downgrade(&self.alerts);
            let alert_id = alert.id;
            AlertAction::new("Clear", move || {
                if let Some(alerts) = alerts.upgrade() {
                    alerts.dismiss(alert_id);
                }
            })
        };
        self.alerts.push(alert.with_actions(vec![retry, clear]));
    }
}

/// One registration's schedule loop. Sleeps for the current delay, then
/// blocks until the registration is runnable, then executes a cycle. Exits
/// when the scheduler is gone; explicit cancellation aborts the task.
async fn run_schedule(
    core: Weak<SchedulerCore>,
    reg: Arc<RegistrationInner>,
    mut visible: watch::Receiver<bool>,
    mut suspended: watch::Receiver<bool>,
) {
    let mut control = reg.watch_control();
    loop {
        tokio::time::sleep(reg.next_delay()).await;

        if !wait_until_runnable(&reg, &mut control, &mut visible, &mut suspended).await {
            return;
        }
        let Some(core) = core.upgrade() else {
            return;
        };

        let guard = reg.execution_guard().await;
        core.execute_cycle(&reg).await;
        drop(guard);
    }
}

/// Block until the registration may execute. Returns false when a control
/// channel closes (the scheduler or gate has been dropped).
async fn wait_until_runnable(
    reg: &RegistrationInner,
    control: &mut watch::Receiver<u64>,
    visible: &mut watch::Receiver<bool>,
    suspended: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        let is_visible = *visible.borrow_and_update();
        let is_suspended = *suspended.borrow_and_update();
        control.borrow_and_update();
        if reg.is_runnable(is_visible, is_suspended) {
            return true;
        }
        tokio::select! {
            changed = control.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            changed = visible.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            changed = suspended.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}
