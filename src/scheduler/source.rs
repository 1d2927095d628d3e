//! Poll source seam between the scheduler and feature code.
//!
//! Feature modules (quest progress, character stats, analytics) supply a
//! [`PollSource`] per registration. The scheduler assumes nothing about the
//! payload beyond "asynchronous, may fail with a [`PollFailure`]".

use crate::error::PollFailure;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::future::Future;

/// A caller-supplied fetch operation invoked once per tick.
#[async_trait]
pub trait PollSource: Send + Sync {
    async fn poll(&self) -> Result<Value, PollFailure>;
}

type FetchFn = Box<dyn Fn() -> BoxFuture<'static, Result<Value, PollFailure>> + Send + Sync>;

/// Adapter turning a plain async closure into a [`PollSource`].
pub struct FnSource {
    fetch: FetchFn,
}

impl FnSource {
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, PollFailure>> + Send + 'static,
    {
        Self {
            fetch: Box::new(move || fetch().boxed()),
        }
    }
}

#[async_trait]
impl PollSource for FnSource {
    async fn poll(&self) -> Result<Value, PollFailure> {
        (self.fetch)().await
    }
}

impl fmt::Debug for FnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_source_forwards_result() {
        let source = FnSource::new(|| async { Ok(json!({"level": 3})) });
        assert_eq!(source.poll().await.unwrap(), json!({"level": 3}));

        let failing = FnSource::new(|| async {
            Err(PollFailure::Network {
                message: "offline".to_string(),
            })
        });
        assert!(failing.poll().await.unwrap_err().is_connectivity());
    }
}
