//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic failures only (validation, invariants, conflicts). Ledger- and
/// conversion-specific failures have their own typed enums in the crates that
/// raise them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
