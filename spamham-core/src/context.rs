//! Per-request context passed explicitly into every core operation

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};

/// Who is asking, and how long they are willing to wait
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Moderator identity, when the caller is authenticated
    pub actor: Option<String>,
    /// Absolute deadline for every store call made on behalf of this request
    pub deadline: Option<Instant>,
}

impl RequestContext {
    /// No identity, no deadline (CLI and background jobs)
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Deadline `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Actor name for log fields
    pub fn actor(&self) -> &str {
        self.actor.as_deref().unwrap_or("anonymous")
    }

    /// Run one store call under the request deadline.
    ///
    /// `op` names the call in the `DeadlineExceeded` error.
    pub async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            None => fut.await,
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| Error::DeadlineExceeded { op })?,
        }
    }
}
