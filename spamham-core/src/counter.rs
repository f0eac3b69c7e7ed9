//! Counter service - the pending count shown to moderators
//!
//! One integer per name, mutated only through the store's single-key
//! transaction. Concurrent adjustments of the same name serialize in the
//! store; contention is retried by [`retry_transient`].

use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::retry::{retry_transient, RetryConfig, RetryResult};
use crate::store::Store;

/// Counter name tracking the size of the pending collection
pub const PENDING_COUNTER: &str = "pending";

/// Atomic signed adjustments of named counters
#[derive(Clone)]
pub struct CounterService {
    store: Arc<dyn Store>,
    retry: RetryConfig,
}

impl CounterService {
    pub fn new(store: Arc<dyn Store>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Add `delta` to counter `name`, returning the new value.
    ///
    /// Contention is retried up to the configured attempts, then fails with
    /// `CounterUnavailable`. A deadline hit mid-transaction fails with
    /// `CounterOutcomeUnknown` and is not retried.
    pub async fn adjust(&self, ctx: &RequestContext, name: &str, delta: i64) -> Result<i64> {
        self.apply(ctx, name, move |count| count.saturating_add(delta))
            .await
            .inspect(|value| {
                tracing::debug!(counter = name, delta, value, actor = ctx.actor(), "Counter adjusted");
            })
    }

    /// Overwrite counter `name` with `value`
    pub async fn set(&self, ctx: &RequestContext, name: &str, value: i64) -> Result<i64> {
        self.apply(ctx, name, move |_| value).await
    }

    /// Current value; 0 when the counter was never created. Never creates it.
    pub async fn read(&self, ctx: &RequestContext, name: &str) -> Result<i64> {
        let value = ctx
            .bounded("read_counter", self.store.read_counter(name))
            .await?;
        Ok(value.unwrap_or(0))
    }

    async fn apply<F>(&self, ctx: &RequestContext, name: &str, f: F) -> Result<i64>
    where
        F: Fn(i64) -> i64 + Send + Sync,
    {
        let f = &f;
        let result = retry_transient(self.retry, move || async move {
            ctx.bounded("transact", self.store.transact(name, f))
                .await
                .map_err(|e| match e {
                    Error::DeadlineExceeded { .. } => Error::CounterOutcomeUnknown {
                        name: name.to_string(),
                    },
                    other => other,
                })
        })
        .await;

        match result {
            RetryResult::Success(value) => Ok(value),
            RetryResult::ExhaustedRetries {
                last_error,
                attempts,
            } => {
                tracing::error!(
                    counter = name,
                    attempts,
                    error = %last_error,
                    "Counter transaction retries exhausted"
                );
                Err(Error::CounterUnavailable {
                    name: name.to_string(),
                    attempts,
                })
            }
            RetryResult::PermanentError(e) => {
                tracing::error!(counter = name, error = %e, "Counter transaction failed");
                Err(e)
            }
        }
    }
}
