use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use venue_core::IdentityId;

/// Claims carried by an identity-backend session token.
///
/// Signature checks belong to the backend; the client only decides whether
/// the validity window covers "now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: IdentityId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    pub fn new(sub: IdentityId, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub,
            issued_at,
            expires_at,
        }
    }

    /// Claims issued at `now` and living for `ttl`.
    pub fn issue(sub: IdentityId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self::new(sub, now, now + ttl)
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("session expired")]
    Expired,

    #[error("session not valid yet")]
    NotYetValid,

    #[error("session expires before it was issued")]
    InvalidTimeWindow,
}

/// Check that `claims` describe a session usable at `now`.
///
/// `leeway` absorbs a backend clock running ahead of this device: a token
/// issued up to `leeway` in the future still counts as valid. Expiry is
/// checked without leeway.
pub fn validate_claims(
    claims: &SessionClaims,
    now: DateTime<Utc>,
    leeway: Duration,
) -> Result<(), ClaimsError> {
    if claims.expires_at <= claims.issued_at {
        return Err(ClaimsError::InvalidTimeWindow);
    }
    if now + leeway < claims.issued_at {
        return Err(ClaimsError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(ClaimsError::Expired);
    }
    Ok(())
}
