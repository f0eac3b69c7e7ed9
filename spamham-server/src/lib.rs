//! spamham-server: HTTP surface for the moderation queue
//!
//! Axum server with:
//! - Identity taken from headers set by a fronting auth proxy
//! - JSON error responses
//! - Request tracing and CORS
//! - Background counter reconciliation
//! - Graceful shutdown

pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{build_router, run_server, ServerConfig, ServerError};
pub use state::AppState;
