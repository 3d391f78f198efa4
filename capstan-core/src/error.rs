//! Shared error taxonomy for object store access
//!
//! Store implementations and everything layered on top of them (repositories,
//! the reconciler) speak this error type. Conflict and Transient are the two
//! locally-retryable classes; Fatal halts the affected application's task and
//! requires operator intervention.

use thiserror::Error;

use crate::domain::object::ObjectKey;

/// Errors surfaced by object store implementations
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The object does not exist
    #[error("object not found: {0}")]
    NotFound(ObjectKey),

    /// Optimistic-concurrency token mismatch; the caller must re-read and
    /// retry. Never silently overwritten.
    #[error("version conflict on {key}: expected {expected:?}, actual {actual}")]
    Conflict {
        key: ObjectKey,
        /// Version the caller presented; None means "create, must not exist"
        expected: Option<u64>,
        actual: u64,
    },

    /// Malformed object rejected before any state change
    #[error("invalid object: {0}")]
    Validation(String),

    /// Network or timeout failure; retried with backoff
    #[error("transient store error: {0}")]
    Transient(String),

    /// Unrecoverable failure (e.g. missing permissions); surfaced
    /// immediately, not retried
    #[error("fatal store error: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Whether a bounded local retry can recover from this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
