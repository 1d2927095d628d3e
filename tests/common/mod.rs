//! Shared helpers for scheduler integration tests.

use async_trait::async_trait;
use polling_core::{PollFailure, PollSource, PollingConfig};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Smallest valid interval; tests run under paused tokio time, so wall
/// duration is irrelevant.
pub const INTERVAL: Duration = Duration::from_secs(5);

pub fn base_config() -> PollingConfig {
    PollingConfig {
        interval: INTERVAL,
        ..Default::default()
    }
}

/// Trait-object poll source that fails a fixed number of initial calls and
/// succeeds afterwards.
pub struct ScriptedSource {
    calls: AtomicU32,
    fail_first: u32,
}

impl ScriptedSource {
    pub fn new(fail_first: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_first,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollSource for ScriptedSource {
    async fn poll(&self) -> Result<Value, PollFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(PollFailure::application("scripted failure"))
        } else {
            Ok(json!({ "call": call }))
        }
    }
}
