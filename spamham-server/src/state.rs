//! Shared application state

use std::time::Duration;

use spamham_core::config::AuthSection;
use spamham_core::{RequestContext, Services};

/// State shared by every handler (wrapped in `Arc` by the router)
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub auth: AuthSection,
    /// Deadline for the store calls of one request; `None` waits forever
    pub request_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(services: Services, auth: AuthSection, request_timeout: Option<Duration>) -> Self {
        Self {
            services,
            auth,
            request_timeout,
        }
    }

    /// Fresh context for one request, carrying the caller and the deadline
    pub fn context(&self, actor: Option<&str>) -> RequestContext {
        let mut ctx = RequestContext::background();
        if let Some(actor) = actor {
            ctx = ctx.with_actor(actor);
        }
        if let Some(timeout) = self.request_timeout {
            ctx = ctx.with_timeout(timeout);
        }
        ctx
    }
}
