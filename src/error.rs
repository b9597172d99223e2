//! Engine error surface for tillkit.
//!
//! Every fallible operation returns [`Result`]. Failures are recoverable by
//! design: an `Err` always means "nothing changed", so the host can surface
//! the message and let the operator retry.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure categories surfaced to the embedding host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Input rejected before any state change (bad quantity, negative
    /// amount, malformed PIN, blank description).
    #[error("validation failed: {0}")]
    Validation(String),

    /// PIN verification failed or a privileged action was attempted
    /// while the price gate is locked.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Lookup by id, index, or key matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The active transaction has no line items.
    #[error("transaction has no line items")]
    EmptyTransaction,

    /// SQLite, lock, or filesystem failure underneath a durable operation.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Wrap a low-level failure with call-site context.
    pub(crate) fn storage(context: &str, e: impl std::fmt::Display) -> Self {
        EngineError::Storage(format!("{context}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = EngineError::storage("set_setting", "disk I/O error");
        assert_eq!(err.to_string(), "storage error: set_setting: disk I/O error");

        let err = EngineError::Validation("quantity must be positive".into());
        assert!(err.to_string().starts_with("validation failed:"));
    }
}
