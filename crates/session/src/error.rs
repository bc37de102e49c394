//! Session-layer error model.

use thiserror::Error;

use venue_auth::ClaimsError;
use venue_core::{DomainError, IdentityId};

/// Failure reported by the identity backend or the profile record store.
///
/// Adapters map their transport errors onto these variants; the engine
/// passes them to callers unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Transient failure (network, timeout). Not retried automatically.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Identity or profile already exists (sign-up race or retry).
    #[error("duplicate identity or profile: {0}")]
    Duplicate(String),

    /// The backend refused or returned something unusable.
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

impl BackendError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Profile hydration / creation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HydrateError {
    /// The identity is live but has no profile row.
    #[error("no profile row for identity {0}")]
    NotFound(IdentityId),

    #[error("invalid profile: {0}")]
    InvalidProfile(#[from] DomainError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Error returned by orchestrator operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Backend failure, surfaced exactly as the adapter reported it.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Signed in at the backend, but the account has no usable profile.
    /// Callers should treat the account as unusable (e.g. force a sign-out).
    #[error("identity {0} has no profile")]
    ProfileNotFound(IdentityId),

    /// The backend accepted the credentials but returned a session this
    /// device cannot use (expired, or issued too far in the future).
    #[error("backend returned an unusable session: {0}")]
    UnusableSession(#[from] ClaimsError),

    /// Caller input failed validation before reaching the backend.
    #[error("invalid input: {0}")]
    Validation(#[from] DomainError),

    /// The session changed (sign-out, invalidation, another sign-in) before
    /// this operation could install its user.
    #[error("session was replaced before it could be established")]
    Superseded,

    /// The orchestrator was shut down or lost its session stream.
    #[error("session engine stopped")]
    EngineStopped,
}

impl From<HydrateError> for SessionError {
    fn from(value: HydrateError) -> Self {
        match value {
            HydrateError::NotFound(id) => Self::ProfileNotFound(id),
            HydrateError::InvalidProfile(err) => Self::Validation(err),
            HydrateError::Backend(err) => Self::Backend(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydrate_not_found_becomes_profile_not_found() {
        let id = IdentityId::parse("id-1").unwrap();
        let err: SessionError = HydrateError::NotFound(id.clone()).into();
        assert_eq!(err, SessionError::ProfileNotFound(id));
    }

    #[test]
    fn backend_errors_pass_through_unchanged() {
        let err: SessionError = HydrateError::Backend(BackendError::unavailable("timeout")).into();
        assert_eq!(err, SessionError::Backend(BackendError::Unavailable("timeout".into())));
        assert_eq!(err.to_string(), "backend unavailable: timeout");
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(BackendError::unavailable("x").is_transient());
        assert!(!BackendError::InvalidCredentials.is_transient());
        assert!(!BackendError::Duplicate("x".into()).is_transient());
    }
}
