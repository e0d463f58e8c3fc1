use thiserror::Error;

/// Application error taxonomy.
///
/// Store and connection failures are never downgraded to "absent": a caller
/// that cannot verify state must fail closed rather than execute a duplicate.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Idempotency key reused with a different request body. A business
    /// outcome, not an infrastructure failure; retrying with the same key
    /// is unsafe.
    #[error("idempotency conflict: {0}")]
    Conflict(String),

    /// The record store backend cannot be reached.
    #[error("idempotency store unavailable: {0}")]
    StoreUnavailable(String),

    /// The wait for a concurrently in-flight duplicate ran out of attempts.
    /// Distinct from StoreUnavailable so callers know a later retry is safe.
    #[error("timed out waiting for in-flight request: {0}")]
    Timeout(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
