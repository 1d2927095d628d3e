//! # Alert Sink
//!
//! Keyed collection of operator-facing notifications produced by the
//! scheduler: polling errors, network errors, circuit-breaker activations,
//! and recoveries.
//!
//! Alerts accumulate per registration until dismissed, bulk-cleared, or
//! superseded by a recovery clear. A `tokio::sync::broadcast` channel lets
//! the rendering layer subscribe to new alerts independently of the polled
//! state snapshots.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Alert categories as rendered by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Error,
    Warning,
    Info,
    Success,
}

/// Escalation level. Circuit-breaker activations escalate above plain
/// polling errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

type AlertActionFn = Arc<dyn Fn() + Send + Sync>;

/// A labelled, invocable operation attached to an alert (e.g. a "Retry"
/// button bound to a forced refresh). Actions are callbacks, not
/// serializable payloads.
#[derive(Clone)]
pub struct AlertAction {
    pub label: String,
    action: AlertActionFn,
}

impl AlertAction {
    pub fn new(label: impl Into<String>, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            action: Arc::new(action),
        }
    }

    pub fn invoke(&self) {
        (self.action)();
    }
}

impl fmt::Debug for AlertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// An operator-visible notification tied (usually) to one registration.
#[derive(Debug, Clone)]
pub struct PollingAlert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub registration_id: Option<String>,
    pub actions: Vec<AlertAction>,
}

impl PollingAlert {
    fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
        registration_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
            registration_id,
            actions: Vec::new(),
        }
    }

    /// Generic polling failure.
    pub fn polling_error(registration_id: &str, message: impl Into<String>) -> Self {
        Self::new(
            AlertKind::Error,
            AlertSeverity::Medium,
            "Polling Error",
            message,
            Some(registration_id.to_string()),
        )
    }

    /// Connectivity-classified failure. Same scheduling treatment as a
    /// generic error, distinct operator label.
    pub fn network_error(registration_id: &str, message: impl Into<String>) -> Self {
        Self::new(
            AlertKind::Error,
            AlertSeverity::Medium,
            "Network Error",
            message,
            Some(registration_id.to_string()),
        )
    }

    /// Circuit breaker latched open after repeated consecutive failures.
    pub fn circuit_breaker(registration_id: &str, consecutive_errors: u32) -> Self {
        Self::new(
            AlertKind::Error,
            AlertSeverity::Critical,
            "Circuit Breaker Activated",
            format!(
                "Polling for '{registration_id}' halted after {consecutive_errors} consecutive failures"
            ),
            Some(registration_id.to_string()),
        )
    }

    /// A success ended an error streak.
    pub fn recovery(registration_id: &str) -> Self {
        Self::new(
            AlertKind::Success,
            AlertSeverity::Low,
            "Polling Recovered",
            format!("Polling for '{registration_id}' is healthy again"),
            Some(registration_id.to_string()),
        )
    }

    pub fn with_actions(mut self, actions: Vec<AlertAction>) -> Self {
        self.actions = actions;
        self
    }
}

/// Shared alert collection with dismiss/clear semantics and a broadcast
/// stream for subscribers.
#[derive(Debug)]
pub struct AlertSink {
    alerts: DashMap<Uuid, PollingAlert>,
    publisher: broadcast::Sender<PollingAlert>,
}

impl AlertSink {
    pub fn new(capacity: usize) -> Self {
        let (publisher, _) = broadcast::channel(capacity);
        Self {
            alerts: DashMap::new(),
            publisher,
        }
    }

    /// Store an alert and notify subscribers. Having no subscribers is not
    /// an error; alerts are still retained for synchronous reads.
    pub fn push(&self, alert: PollingAlert) -> Uuid {
        let id = alert.id;
        info!(
            alert_id = %id,
            registration_id = alert.registration_id.as_deref(),
            severity = ?alert.severity,
            title = %alert.title,
            "Alert raised"
        );
        self.alerts.insert(id, alert.clone());
        let _ = self.publisher.send(alert);
        id
    }

    /// All current alerts, newest first.
    pub fn alerts(&self) -> Vec<PollingAlert> {
        let mut all: Vec<PollingAlert> = self.alerts.iter().map(|a| a.value().clone()).collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all
    }

    /// Alerts attached to one registration, newest first.
    pub fn alerts_for(&self, registration_id: &str) -> Vec<PollingAlert> {
        let mut matching: Vec<PollingAlert> = self
            .alerts
            .iter()
            .filter(|a| a.registration_id.as_deref() == Some(registration_id))
            .map(|a| a.value().clone())
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching
    }

    pub fn dismiss(&self, alert_id: Uuid) -> bool {
        let removed = self.alerts.remove(&alert_id).is_some();
        if removed {
            debug!(alert_id = %alert_id, "Alert dismissed");
        }
        removed
    }

    pub fn clear_all(&self) {
        self.alerts.clear();
    }

    /// Remove every alert attached to `registration_id`. Called on
    /// unregister and on recovery (a recovery supersedes the error alerts
    /// it resolves).
    pub fn clear_for_registration(&self, registration_id: &str) {
        self.alerts
            .retain(|_, alert| alert.registration_id.as_deref() != Some(registration_id));
    }

    /// Subscribe to alerts raised after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PollingAlert> {
        self.publisher.subscribe()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
