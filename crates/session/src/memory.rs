//! In-memory identity backend and profile store.
//!
//! Used by the console and by tests. Both support fault injection so the
//! failure paths of the engine can be driven deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::{mpsc, watch};

use venue_auth::SessionClaims;
use venue_core::{Email, IdentityId};

use crate::backend::{BackendSession, IdentityBackend, ProfileStore, RawSessionEvent, SessionChangeKind};
use crate::error::BackendError;
use crate::profile::{Credentials, Profile};

// ─────────────────────────────────────────────────────────────────────────────
// Identity backend
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Account {
    id: IdentityId,
    password: String,
}

#[derive(Debug, Default)]
struct IdentityState {
    /// Keyed by lowercased email.
    accounts: HashMap<String, Account>,
    session: Option<BackendSession>,
    listeners: Vec<mpsc::UnboundedSender<RawSessionEvent>>,
    unavailable: bool,
}

impl IdentityState {
    /// Record the new session and notify every live listener, in order.
    fn transition(&mut self, kind: SessionChangeKind, session: Option<BackendSession>) {
        self.session = session.clone();
        let event = RawSessionEvent::new(kind, session);
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.unavailable {
            Err(BackendError::unavailable("identity backend offline"))
        } else {
            Ok(())
        }
    }
}

/// Single-device identity provider: at most one live session.
#[derive(Debug)]
pub struct InMemoryIdentityBackend {
    state: Mutex<IdentityState>,
    session_ttl: Duration,
    /// How far this backend's clock runs ahead of the caller's.
    clock_offset: Duration,
}

impl Default for InMemoryIdentityBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentityBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IdentityState::default()),
            session_ttl: Duration::hours(1),
            clock_offset: Duration::zero(),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Stamp issued sessions as if this backend's clock were `offset`
    /// ahead of the local one (negative for behind).
    pub fn with_clock_offset(mut self, offset: Duration) -> Self {
        self.clock_offset = offset;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, IdentityState>, BackendError> {
        self.state
            .lock()
            .map_err(|_| BackendError::unavailable("identity state lock poisoned"))
    }

    fn issue(&self, id: IdentityId) -> BackendSession {
        BackendSession::new(SessionClaims::issue(id, Utc::now() + self.clock_offset, self.session_ttl))
    }

    /// Create an account without signing it in.
    pub fn register_account(&self, email: &Email, password: &str) -> Result<IdentityId, BackendError> {
        self.register_account_as(IdentityId::generate(), email, password)
    }

    /// Create an account under a caller-chosen identity id.
    pub fn register_account_as(
        &self,
        id: IdentityId,
        email: &Email,
        password: &str,
    ) -> Result<IdentityId, BackendError> {
        let mut state = self.lock()?;
        let key = email.as_str().to_ascii_lowercase();
        if state.accounts.contains_key(&key) {
            return Err(BackendError::Duplicate(format!("email {email} already registered")));
        }
        if state.accounts.values().any(|account| account.id == id) {
            return Err(BackendError::Duplicate(format!("identity {id} already exists")));
        }
        state.accounts.insert(
            key,
            Account {
                id: id.clone(),
                password: password.to_string(),
            },
        );
        Ok(id)
    }

    /// Pretend a session for `id` survived from a previous run. Emits nothing.
    pub fn restore_session(&self, id: IdentityId) -> Result<(), BackendError> {
        let session = self.issue(id);
        self.lock()?.session = Some(session);
        Ok(())
    }

    /// Install an arbitrary persisted session (e.g. one that already expired).
    pub fn restore_claims(&self, claims: SessionClaims) -> Result<(), BackendError> {
        self.lock()?.session = Some(BackendSession::new(claims));
        Ok(())
    }

    /// Revoke the live session from the backend side.
    pub fn invalidate(&self) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        state.transition(SessionChangeKind::Invalidated, None);
        Ok(())
    }

    /// Rotate the live session's token. No-op when signed out.
    pub fn refresh_token(&self) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        let Some(current) = state.session.clone() else {
            return Ok(());
        };
        let refreshed = self.issue(current.claims.sub);
        state.transition(SessionChangeKind::TokenRefreshed, Some(refreshed));
        Ok(())
    }

    /// While set, every backend call fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = unavailable;
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state
            .lock()
            .map(|mut s| {
                s.listeners.retain(|tx| !tx.is_closed());
                s.listeners.len()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl IdentityBackend for InMemoryIdentityBackend {
    async fn sign_in(&self, credentials: &Credentials) -> Result<BackendSession, BackendError> {
        let mut state = self.lock()?;
        state.check_available()?;

        let key = credentials.email().as_str().to_ascii_lowercase();
        let id = match state.accounts.get(&key) {
            Some(account) if account.password == credentials.password() => account.id.clone(),
            _ => return Err(BackendError::InvalidCredentials),
        };

        let session = self.issue(id);
        state.transition(SessionChangeKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<BackendSession, BackendError> {
        let mut state = self.lock()?;
        state.check_available()?;

        let key = credentials.email().as_str().to_ascii_lowercase();
        if state.accounts.contains_key(&key) {
            return Err(BackendError::Duplicate(format!(
                "email {} already registered",
                credentials.email()
            )));
        }

        let id = IdentityId::generate();
        state.accounts.insert(
            key,
            Account {
                id: id.clone(),
                password: credentials.password().to_string(),
            },
        );

        let session = self.issue(id);
        state.transition(SessionChangeKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        state.check_available()?;
        state.transition(SessionChangeKind::SignedOut, None);
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<BackendSession>, BackendError> {
        let state = self.lock()?;
        state.check_available()?;
        Ok(state.session.clone())
    }

    fn session_events(&self) -> mpsc::UnboundedReceiver<RawSessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut state) = self.state.lock() {
            state.listeners.push(tx);
        }
        rx
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Profile store
// ─────────────────────────────────────────────────────────────────────────────

/// Profile rows keyed by identity id.
#[derive(Debug)]
pub struct InMemoryProfileStore {
    rows: RwLock<HashMap<String, serde_json::Value>>,
    reads_paused: watch::Sender<bool>,
    pending_reads: AtomicUsize,
    unavailable: AtomicBool,
    reject_inserts: AtomicBool,
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            reads_paused: watch::channel(false).0,
            pending_reads: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            reject_inserts: AtomicBool::new(false),
        }
    }

    /// Store `profile` as a row, replacing any existing one.
    pub fn seed(&self, profile: &Profile) -> Result<(), BackendError> {
        let row = serde_json::to_value(profile)
            .map_err(|e| BackendError::rejected(format!("profile encoding failed: {e}")))?;
        self.insert_raw(row);
        Ok(())
    }

    /// Store an arbitrary row keyed by its `id` field. Rows without a string
    /// id are ignored.
    pub fn insert_raw(&self, row: serde_json::Value) {
        let Some(id) = row_id(&row) else {
            return;
        };
        if let Ok(mut rows) = self.rows.write() {
            rows.insert(id, row);
        }
    }

    pub fn remove(&self, id: &IdentityId) -> bool {
        self.rows
            .write()
            .map(|mut rows| rows.remove(id.as_str()).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hold every read until [`Self::resume_reads`] is called.
    pub fn pause_reads(&self) {
        self.reads_paused.send_replace(true);
    }

    pub fn resume_reads(&self) {
        self.reads_paused.send_replace(false);
    }

    /// Reads currently held by [`Self::pause_reads`].
    pub fn pending_reads(&self) -> usize {
        self.pending_reads.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// While set, inserts fail with `Rejected` (e.g. a failing constraint).
    pub fn set_reject_inserts(&self, reject: bool) {
        self.reject_inserts.store(reject, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BackendError::unavailable("profile store offline"))
        } else {
            Ok(())
        }
    }
}

fn row_id(row: &serde_json::Value) -> Option<String> {
    row.get("id").and_then(|v| v.as_str()).map(str::to_string)
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn select_by_id(&self, id: &IdentityId) -> Result<Vec<serde_json::Value>, BackendError> {
        self.check_available()?;

        let mut paused = self.reads_paused.subscribe();
        if *paused.borrow() {
            self.pending_reads.fetch_add(1, Ordering::SeqCst);
            let released = paused.wait_for(|p| !*p).await.is_ok();
            self.pending_reads.fetch_sub(1, Ordering::SeqCst);
            if !released {
                return Err(BackendError::unavailable("profile store shut down"));
            }
        }

        let rows = self
            .rows
            .read()
            .map_err(|_| BackendError::unavailable("profile rows lock poisoned"))?;
        Ok(rows.get(id.as_str()).cloned().into_iter().collect())
    }

    async fn insert(&self, row: serde_json::Value) -> Result<serde_json::Value, BackendError> {
        self.check_available()?;
        if self.reject_inserts.load(Ordering::SeqCst) {
            return Err(BackendError::rejected("profile insert refused"));
        }

        let id = row_id(&row).ok_or_else(|| BackendError::rejected("profile row has no id"))?;
        let mut rows = self
            .rows
            .write()
            .map_err(|_| BackendError::unavailable("profile rows lock poisoned"))?;
        if rows.contains_key(&id) {
            return Err(BackendError::Duplicate(format!("profile {id} already exists")));
        }
        rows.insert(id, row.clone());
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials::new(email, password).unwrap()
    }

    #[tokio::test]
    async fn sign_in_emits_before_returning() {
        let backend = InMemoryIdentityBackend::new();
        let email = Email::parse("ana@venue.test").unwrap();
        let id = backend.register_account(&email, "pw").unwrap();
        let mut events = backend.session_events();

        let session = backend.sign_in(&creds("ANA@venue.test", "pw")).await.unwrap();
        assert_eq!(session.identity_id(), &id);

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, SessionChangeKind::SignedIn);
        assert_eq!(event.session, Some(session));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let backend = InMemoryIdentityBackend::new();
        let email = Email::parse("ana@venue.test").unwrap();
        backend.register_account(&email, "pw").unwrap();

        let err = backend.sign_in(&creds("ana@venue.test", "nope")).await.unwrap_err();
        assert_eq!(err, BackendError::InvalidCredentials);
        assert_eq!(backend.current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_rejected() {
        let backend = InMemoryIdentityBackend::new();
        backend.sign_up(&creds("ana@venue.test", "pw")).await.unwrap();
        let err = backend.sign_up(&creds("Ana@Venue.test", "pw")).await.unwrap_err();
        assert!(matches!(err, BackendError::Duplicate(_)));
    }

    #[tokio::test]
    async fn refresh_keeps_identity_and_notifies() {
        let backend = InMemoryIdentityBackend::new();
        let session = backend.sign_up(&creds("ana@venue.test", "pw")).await.unwrap();
        let mut events = backend.session_events();

        backend.refresh_token().unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, SessionChangeKind::TokenRefreshed);
        assert_eq!(
            event.session.as_ref().map(|s| s.identity_id()),
            Some(session.identity_id())
        );
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let backend = InMemoryIdentityBackend::new();
        backend.set_unavailable(true);
        assert!(backend.current_session().await.unwrap_err().is_transient());
        assert!(backend.sign_out().await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn dropped_listeners_are_pruned() {
        let backend = InMemoryIdentityBackend::new();
        let keep = backend.session_events();
        drop(backend.session_events());
        assert_eq!(backend.listener_count(), 1);
        drop(keep);
        assert_eq!(backend.listener_count(), 0);
    }

    #[tokio::test]
    async fn store_rejects_rows_without_id() {
        let store = InMemoryProfileStore::new();
        let err = store.insert(serde_json::json!({ "name": "x" })).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn paused_reads_wait_for_resume() {
        let store = std::sync::Arc::new(InMemoryProfileStore::new());
        store.insert_raw(serde_json::json!({ "id": "id-1" }));
        store.pause_reads();

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                let id = IdentityId::parse("id-1").unwrap();
                store.select_by_id(&id).await
            })
        };

        while store.pending_reads() == 0 {
            tokio::task::yield_now().await;
        }
        store.resume_reads();

        let rows = reader.await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.pending_reads(), 0);
    }
}
