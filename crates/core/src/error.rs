//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation, invariants, conflicts,
/// authorization). Anything infrastructure-shaped belongs elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed or empty input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. illegal state transition).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record does not exist.
    #[error("not found")]
    NotFound,

    /// A conflicting record or reference blocks the operation
    /// (e.g. deleting an invoice line still referenced by a sale).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The acting context lacks a required permission.
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
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

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(permission: impl Into<String>) -> Self {
        Self::Forbidden(permission.into())
    }
}
