//! Error kinds for ringtsdb
//!
//! The spec speaks in terms of error *kinds*, not types: `VALIDATION`,
//! `NOT_FOUND`, `CONFLICT`, `TYPE_MISMATCH`, `LIMIT_EXCEEDED`,
//! `BACKEND_TRANSIENT` (retryable), `BACKEND_FATAL` (not retryable). This
//! module defines one `Error` enum whose variants map 1:1 onto those kinds,
//! following the same shape as `strata-core::error::Error`.

use thiserror::Error;

/// Result type alias for ringtsdb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for ringtsdb.
#[derive(Debug, Error)]
pub enum Error {
    /// User input failed validation (bad SQL, unknown function, unbounded
    /// scan, out-of-range `step`/`slots`, malformed ingest payload).
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist (unknown metric, empty selector
    /// resolution, write to a `deleting` metric).
    #[error("not found: {0}")]
    NotFound(String),

    /// Concurrent create raced and lost, or a commit conflict surfaced
    /// after the internal retry was exhausted.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation is valid for one sample type but not the one stored
    /// (e.g. `retention_rewrite` on a counter).
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A row, byte, or key-count cap was exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// The backend failed in a way that is safe to retry
    /// (commit conflict exhausted retries, transaction timed out).
    #[error("backend transient error: {0}")]
    BackendTransient(String),

    /// The backend failed in a way that is not safe to retry.
    #[error("backend fatal error: {0}")]
    BackendFatal(String),
}

impl Error {
    /// Machine-readable reason code for the outer (HTTP or RPC) layer.
    ///
    /// Stable across releases; never reused across kinds.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::TypeMismatch(_) => "type_mismatch",
            Error::LimitExceeded(_) => "limit_exceeded",
            Error::BackendTransient(_) => "backend_transient",
            Error::BackendFatal(_) => "backend_fatal",
        }
    }

    /// Whether the caller may retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BackendTransient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(Error::Validation("x".into()).reason_code(), "validation");
        assert_eq!(Error::NotFound("x".into()).reason_code(), "not_found");
        assert_eq!(Error::Conflict("x".into()).reason_code(), "conflict");
        assert_eq!(
            Error::TypeMismatch("x".into()).reason_code(),
            "type_mismatch"
        );
        assert_eq!(
            Error::LimitExceeded("x".into()).reason_code(),
            "limit_exceeded"
        );
    }

    #[test]
    fn only_backend_transient_is_retryable() {
        assert!(Error::BackendTransient("x".into()).is_retryable());
        assert!(!Error::BackendFatal("x".into()).is_retryable());
        assert!(!Error::Conflict("x".into()).is_retryable());
    }
}
