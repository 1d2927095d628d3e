//! # Error Types
//!
//! Crate-level error handling plus the tagged failure type produced at the
//! polling callback boundary. Failure classification (network vs. generic)
//! is a pattern match on [`PollFailure`], never string inspection.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors surfaced by the polling core's own plumbing (settings loading,
/// subscription handling). The scheduler API itself never returns these:
/// per the propagation policy, execution failures are captured into state
/// and alerts rather than thrown at the caller.
#[derive(Debug, thiserror::Error)]
pub enum PollingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Alert channel error: {0}")]
    AlertChannel(String),
}

impl From<config::ConfigError> for PollingError {
    fn from(err: config::ConfigError) -> Self {
        PollingError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PollingError>;

/// Failure produced by a poll source when a fetch attempt does not settle
/// successfully.
///
/// The variants are the error taxonomy: connectivity-shaped failures
/// (`Network`, `Timeout`) get a distinct operator alert, everything else is
/// a generic polling error. All variants are transient from the scheduler's
/// point of view and feed the same backoff/circuit-breaker arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollFailure {
    /// Connectivity failure reported by the transport layer.
    #[error("network error: {message}")]
    Network { message: String },

    /// The fetch did not settle within the caller's own deadline.
    #[error("timeout after {after:?} during {operation}")]
    Timeout { operation: String, after: Duration },

    /// Any non-connectivity rejection (server error, decode failure, etc.).
    #[error("application error: {message}")]
    Application {
        message: String,
        code: Option<String>,
    },
}

impl PollFailure {
    /// Convenience constructor for the common application-error case.
    pub fn application(message: impl Into<String>) -> Self {
        PollFailure::Application {
            message: message.into(),
            code: None,
        }
    }

    /// Connectivity-shaped failures are alerted distinctly from generic
    /// polling errors.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            PollFailure::Network { .. } | PollFailure::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        let network = PollFailure::Network {
            message: "connection refused".to_string(),
        };
        let timeout = PollFailure::Timeout {
            operation: "quest_progress".to_string(),
            after: Duration::from_secs(10),
        };
        let app = PollFailure::application("500 internal server error");

        assert!(network.is_connectivity());
        assert!(timeout.is_connectivity());
        assert!(!app.is_connectivity());
    }

    #[test]
    fn test_failure_display() {
        let failure = PollFailure::Application {
            message: "bad payload".to_string(),
            code: Some("E_DECODE".to_string()),
        };
        assert_eq!(failure.to_string(), "application error: bad payload");
    }

    #[test]
    fn test_failure_serialization_round_trip() {
        let failure = PollFailure::Network {
            message: "dns lookup failed".to_string(),
        };
        let json = serde_json::to_string(&failure).unwrap();
        let back: PollFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(failure, back);
    }
}
