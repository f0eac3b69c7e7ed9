/// Structured error types for spamham-core.
///
/// Uses `thiserror` so the server can map each failure to a status code.
/// The CLI wraps these in `anyhow` at the edges.
use thiserror::Error;

use crate::store::ItemKey;

/// Main error type for queue, counter and store operations
#[derive(Error, Debug)]
pub enum Error {
    /// Item or record absent
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Categorize target is not a terminal collection
    #[error("Invalid categorize target '{target}' (expected 'spam' or 'ham')")]
    InvalidTarget { target: String },

    /// Opaque item key could not be decoded
    #[error("Invalid item key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Ingested payload is not a single JSON value
    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },

    /// Single-key transaction lost against a concurrent writer
    #[error("Transaction contention on '{key}'")]
    Contention { key: String },

    /// Store could not be reached or refused the operation
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request deadline elapsed while waiting on the store
    #[error("Deadline exceeded during {op}")]
    DeadlineExceeded { op: &'static str },

    /// Counter adjustment gave up after repeated contention
    #[error("Counter '{name}' unavailable after {attempts} attempts")]
    CounterUnavailable { name: String, attempts: u32 },

    /// Counter transaction timed out; it may or may not have been applied
    #[error("Counter '{name}' adjustment outcome unknown (deadline elapsed); re-read to confirm")]
    CounterOutcomeUnknown { name: String },

    /// Categorize completed some but not all of its steps
    #[error(transparent)]
    PartialCategorize(#[from] PartialCategorizeFailure),
}

/// Result type alias for spamham-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// A categorize that stopped between steps, leaving drift behind.
#[derive(Error, Debug)]
pub enum PartialCategorizeFailure {
    /// Copy written to the target but the original is still pending
    #[error("item {original} copied to {copy} but not removed from pending: {source}")]
    Duplicate {
        original: ItemKey,
        copy: ItemKey,
        #[source]
        source: Box<Error>,
    },

    /// Item moved but the pending counter was not decremented
    #[error("item {original} moved to {copy} but pending counter not decremented: {source}")]
    Miscount {
        original: ItemKey,
        copy: ItemKey,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn invalid_target(target: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
        }
    }

    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Worth retrying with the same input
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Connectivity or backend failure rather than a caller mistake
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::Database(_))
    }
}
