//! Seams to the hosted identity provider and the profile record store.
//!
//! Both are consumed as black boxes. Adapters translate their wire formats
//! into these types and their transport failures into [`BackendError`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use venue_auth::{ClaimsError, SessionClaims, validate_claims};
use venue_core::IdentityId;

use crate::error::BackendError;
use crate::profile::Credentials;

/// A live session as reported by the identity backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSession {
    pub claims: SessionClaims,
}

impl BackendSession {
    pub fn new(claims: SessionClaims) -> Self {
        Self { claims }
    }

    pub fn identity_id(&self) -> &IdentityId {
        &self.claims.sub
    }

    /// Whether the session can be used at `now`, tolerating a backend clock
    /// up to `leeway` ahead.
    pub fn validate(&self, now: DateTime<Utc>, leeway: Duration) -> Result<(), ClaimsError> {
        validate_claims(&self.claims, now, leeway)
    }
}

/// What the backend says happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionChangeKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    /// The backend revoked the session on its own (expiry, remote logout).
    Invalidated,
}

/// Raw session change notification. `session` is `None` when signed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSessionEvent {
    pub kind: SessionChangeKind,
    pub session: Option<BackendSession>,
}

impl RawSessionEvent {
    pub fn new(kind: SessionChangeKind, session: Option<BackendSession>) -> Self {
        Self { kind, session }
    }
}

/// Hosted identity provider.
///
/// Implementations must deliver events on each receiver in the order they
/// occurred, and should emit the change caused by `sign_in`/`sign_up`/
/// `sign_out` before the call returns.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<BackendSession, BackendError>;

    /// Create an identity for `credentials` and return its session.
    async fn sign_up(&self, credentials: &Credentials) -> Result<BackendSession, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Session persisted from an earlier run, if any.
    async fn current_session(&self) -> Result<Option<BackendSession>, BackendError>;

    /// Register a listener for raw session changes.
    fn session_events(&self) -> mpsc::UnboundedReceiver<RawSessionEvent>;
}

/// Keyed record store holding profile rows.
///
/// Rows are JSON objects; decoding into [`crate::Profile`] happens in the
/// hydrator so the store stays schema-agnostic.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Rows whose primary key equals `id`.
    async fn select_by_id(&self, id: &IdentityId) -> Result<Vec<serde_json::Value>, BackendError>;

    /// Insert `row` and return it as stored.
    async fn insert(&self, row: serde_json::Value) -> Result<serde_json::Value, BackendError>;
}
