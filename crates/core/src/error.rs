//! Validation failures of domain values.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Input that cannot become a domain value.
///
/// Backend and transport failures are not domain errors; the session layer
/// has its own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed field (email, document number, names).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid identity id: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
