#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Polling Core
//!
//! Resilient client-side polling scheduler: repeatedly invokes
//! caller-supplied async fetch operations on per-registration timers while
//! absorbing transient failures, suspending itself when the hosting surface
//! is not visible, degrading gracefully to cached results, and surfacing
//! operator-visible alerts.
//!
//! ## Architecture
//!
//! - [`scheduler`] - Registration table, schedule loops, backoff and
//!   circuit-breaker arithmetic
//! - [`cache`] - Keyed TTL store of last-known-good payloads
//! - [`alerts`] - Operator alert sink with dismiss/clear semantics and a
//!   broadcast subscription stream
//! - [`visibility`] - Foreground/background gate (defaults to visible)
//! - [`config`] - Typed per-registration config, patch application, and
//!   scheduler-wide settings
//! - [`error`] - Crate errors and the tagged poll-failure taxonomy
//!
//! ## Guarantees
//!
//! At most one execution is in flight per registration at any time; a tick
//! is not re-armed until the previous execution settles. While a circuit
//! breaker is open the callback is never invoked until an explicit reset or
//! a successful forced refresh. Invalid configuration is corrected by
//! clamping, never raised.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use polling_core::{PollingConfig, PollingScheduler, SchedulerSettings};
//! use serde_json::json;
//!
//! # async fn example() {
//! let scheduler = PollingScheduler::new(SchedulerSettings::default());
//!
//! scheduler.register_fn(
//!     "quest_progress",
//!     || async {
//!         // fetch from the quest endpoint here
//!         Ok(json!({"completed": 7}))
//!     },
//!     PollingConfig::default(),
//! );
//!
//! // The rendering layer reads snapshots and alerts synchronously.
//! let snapshot = scheduler.get_registration("quest_progress");
//! let alerts = scheduler.alerts().alerts();
//! # let _ = (snapshot, alerts);
//! # }
//! ```

pub mod alerts;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod visibility;

pub use alerts::{AlertAction, AlertKind, AlertSeverity, AlertSink, PollingAlert};
pub use cache::{CacheEntry, CacheStore, CachedRead};
pub use config::{PollingConfig, PollingConfigPatch, SchedulerSettings};
pub use error::{PollFailure, PollingError, Result};
pub use scheduler::{
    ErrorStats, FnSource, PollSource, PollingScheduler, PollingState, RegistrationSnapshot,
};
pub use visibility::VisibilityGate;
