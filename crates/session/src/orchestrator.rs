//! Session orchestrator.
//!
//! Owns the authoritative "current user" and keeps it consistent with the
//! identity backend. Every change goes through one `watch` cell:
//!
//! - a single consumer task applies published [`SessionState`]s in order;
//! - hydrations run concurrently but carry a [`Ticket`] (generation +
//!   identity) and only install if the cell still matches it;
//! - a new identity or a sign-out bumps the generation, so any hydration
//!   started for an older session is discarded on completion.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

use venue_auth::{GuardDecision, NavigationEntry, Role, guard, menu_for, route_for, title_for};
use venue_core::IdentityId;
use venue_events::Subscription;

use crate::backend::{BackendSession, IdentityBackend, ProfileStore};
use crate::config::SessionConfig;
use crate::error::{BackendError, HydrateError, SessionError};
use crate::hydrator::ProfileHydrator;
use crate::profile::{Credentials, NewProfile, Profile};
use crate::publisher::{SessionPublisher, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    SignedOut,
    /// Waiting on the identity backend for an explicit sign-in/up.
    Authenticating,
    /// Identity known, profile not installed yet.
    Hydrating,
    Ready,
}

/// Everything the orchestrator knows, published as one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    /// Bumped whenever the session identity changes or is cleared.
    pub generation: u64,
    pub identity_id: Option<IdentityId>,
    pub user: Option<Arc<Profile>>,
    /// Sequence of the last published state applied (0 before bootstrap).
    pub sequence: u64,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            phase: SessionPhase::SignedOut,
            generation: 0,
            identity_id: None,
            user: None,
            sequence: 0,
        }
    }

    /// Authenticated iff a profile is installed for the live identity.
    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Ready && self.user.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().and_then(|user| user.role)
    }

    /// Role used for navigation: anonymous while signed out.
    pub fn navigation_role(&self) -> Option<Role> {
        if self.is_authenticated() {
            self.role()
        } else {
            Some(Role::AnonymousCustomer)
        }
    }

    fn ticket(&self) -> Option<Ticket> {
        self.identity_id.as_ref().map(|id| Ticket {
            generation: self.generation,
            identity_id: id.clone(),
        })
    }

    /// Forget the session. Returns whether anything changed.
    fn reset(&mut self) -> bool {
        if self.identity_id.is_none() && self.user.is_none() && self.phase == SessionPhase::SignedOut {
            return false;
        }
        self.generation += 1;
        self.identity_id = None;
        self.user = None;
        self.phase = SessionPhase::SignedOut;
        true
    }

    /// Make `id` the session identity, starting a new generation if it
    /// differs from the current one.
    fn enter(&mut self, id: &IdentityId) -> Ticket {
        if self.identity_id.as_ref() != Some(id) {
            self.generation += 1;
            self.identity_id = Some(id.clone());
            self.user = None;
            self.phase = SessionPhase::Hydrating;
        } else if self.phase != SessionPhase::Ready {
            self.phase = SessionPhase::Hydrating;
        }
        Ticket {
            generation: self.generation,
            identity_id: id.clone(),
        }
    }
}

/// Proof of which session a hydration was started for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Ticket {
    generation: u64,
    identity_id: IdentityId,
}

impl Ticket {
    fn is_current(&self, snap: &SessionSnapshot) -> bool {
        snap.generation == self.generation && snap.identity_id.as_ref() == Some(&self.identity_id)
    }
}

struct Engine {
    backend: Arc<dyn IdentityBackend>,
    publisher: Arc<SessionPublisher>,
    hydrator: ProfileHydrator,
    config: SessionConfig,
    cell: watch::Sender<SessionSnapshot>,
    stopped: AtomicBool,
}

impl Engine {
    fn snapshot(&self) -> SessionSnapshot {
        self.cell.borrow().clone()
    }

    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        let limit = self.config.request_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| BackendError::unavailable(format!("{what} timed out after {limit:?}")))?
    }

    /// Apply one published state. Called from the consumer task only.
    fn apply(&self, sequence: u64, state: &SessionState) -> Option<Ticket> {
        let mut ticket = None;
        self.cell.send_modify(|snap| {
            snap.sequence = sequence;
            match state.identity_id() {
                Some(id) => ticket = Some(snap.enter(id)),
                None => {
                    if snap.reset() {
                        tracing::info!(generation = snap.generation, "session ended");
                    }
                }
            }
        });
        ticket
    }

    /// Install `profile` if `ticket` still names the live session.
    fn install(&self, ticket: &Ticket, profile: Profile) -> Option<Arc<Profile>> {
        let mut installed = None;
        self.cell.send_if_modified(|snap| {
            if !ticket.is_current(snap) {
                return false;
            }
            if let Some(existing) = snap.user.as_ref().filter(|user| ***user == profile) {
                installed = Some(Arc::clone(existing));
                let changed = snap.phase != SessionPhase::Ready;
                snap.phase = SessionPhase::Ready;
                return changed;
            }
            let user = Arc::new(profile);
            installed = Some(Arc::clone(&user));
            snap.user = Some(user);
            snap.phase = SessionPhase::Ready;
            true
        });

        match &installed {
            Some(user) => tracing::info!(
                identity = %ticket.identity_id,
                role = ?user.role,
                generation = ticket.generation,
                "profile installed"
            ),
            None => tracing::debug!(
                identity = %ticket.identity_id,
                generation = ticket.generation,
                "discarding profile for a superseded session"
            ),
        }
        installed
    }

    /// Record a failed hydration. Without `force`, an already installed
    /// user for the same session is kept.
    fn fail(&self, ticket: &Ticket, force: bool) {
        self.cell.send_if_modified(|snap| {
            if !ticket.is_current(snap) || (snap.phase == SessionPhase::Ready && !force) {
                return false;
            }
            let changed = snap.phase != SessionPhase::SignedOut || snap.user.is_some();
            snap.phase = SessionPhase::SignedOut;
            snap.user = None;
            changed
        });
    }

    fn mark_authenticating(&self) {
        self.cell.send_if_modified(|snap| {
            if snap.phase != SessionPhase::SignedOut {
                return false;
            }
            snap.phase = SessionPhase::Authenticating;
            true
        });
    }

    fn abandon_authenticating(&self) {
        self.cell.send_if_modified(|snap| {
            if snap.phase != SessionPhase::Authenticating {
                return false;
            }
            snap.phase = SessionPhase::SignedOut;
            true
        });
    }

    /// Wait (bounded) until the consumer has applied `sequence`.
    async fn caught_up(&self, sequence: u64) {
        let mut rx = self.cell.subscribe();
        let wait = rx.wait_for(|snap| snap.sequence >= sequence);
        if tokio::time::timeout(self.config.request_timeout, wait).await.is_err() {
            tracing::warn!(sequence, "session consumer did not catch up in time");
        }
    }

    /// Take a ticket for `id` after the backend accepted an explicit
    /// sign-in/up that started when the publisher was at `observed`.
    ///
    /// Fails with `Superseded` if the backend reported a different session
    /// after accepting this one (e.g. it was invalidated right away).
    async fn join(&self, id: &IdentityId, observed: u64) -> Result<Ticket, SessionError> {
        let target = self.publisher.current().0;
        if target > observed {
            self.caught_up(target).await;
        }

        let mut outcome = Err(SessionError::Superseded);
        self.cell.send_if_modified(|snap| {
            let owned = snap.identity_id.as_ref() == Some(id);
            if !owned && target > observed {
                return false;
            }
            let before = (snap.generation, snap.phase);
            outcome = Ok(snap.enter(id));
            before != (snap.generation, snap.phase)
        });
        outcome
    }

    /// Apply the publisher's claims rule to a session returned by an
    /// explicit sign-in/up, so a session the consumer will treat as signed
    /// out is never installed.
    fn usable(&self, session: &BackendSession) -> Result<(), SessionError> {
        session
            .validate(Utc::now(), self.config.claims_leeway())
            .map_err(|err| {
                tracing::warn!(
                    identity = %session.identity_id(),
                    error = %err,
                    "backend returned an unusable session"
                );
                SessionError::from(err)
            })
    }

    /// The user installed for `ticket`'s session, if it is ready.
    fn installed(&self, ticket: &Ticket) -> Option<Arc<Profile>> {
        let snap = self.cell.borrow();
        if ticket.is_current(&snap) && snap.is_authenticated() {
            snap.user.clone()
        } else {
            None
        }
    }

    /// Mark `id` as unusable without starting a new generation.
    fn reject_identity(&self, id: &IdentityId) {
        self.cell.send_if_modified(|snap| {
            if snap.identity_id.as_ref() != Some(id) || snap.phase == SessionPhase::Ready {
                return false;
            }
            snap.phase = SessionPhase::SignedOut;
            snap.user = None;
            true
        });
    }

    async fn hydrate_in_background(self: Arc<Self>, ticket: Ticket) {
        match self.hydrator.hydrate(&ticket.identity_id).await {
            Ok(profile) => {
                self.install(&ticket, profile);
            }
            Err(err) => {
                tracing::warn!(
                    identity = %ticket.identity_id,
                    error = %err,
                    "profile hydration failed; session stays unauthenticated"
                );
                self.fail(&ticket, false);
            }
        }
    }
}

async fn consume(engine: Arc<Engine>, mut subscription: Subscription<SessionState>) {
    let mut last = 0;
    while let Some(envelope) = subscription.recv().await {
        let sequence = envelope.sequence();
        if sequence <= last {
            tracing::warn!(sequence, last, "ignoring out-of-order session state");
            continue;
        }
        last = sequence;

        if let Some(ticket) = engine.apply(sequence, envelope.message()) {
            tokio::spawn(Arc::clone(&engine).hydrate_in_background(ticket));
        }
    }
    tracing::debug!("session publisher closed; consumer stopping");
}

/// Single source of truth for the signed-in user.
///
/// Dropping the orchestrator stops its consumer task.
pub struct SessionOrchestrator {
    engine: Arc<Engine>,
    consumer: JoinHandle<()>,
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("snapshot", &self.engine.snapshot())
            .finish_non_exhaustive()
    }
}

impl SessionOrchestrator {
    /// Start a publisher for `backend` and an orchestrator on top of it.
    /// Must be called from within a Tokio runtime.
    pub fn start(
        backend: Arc<dyn IdentityBackend>,
        store: Arc<dyn ProfileStore>,
        config: &SessionConfig,
    ) -> Self {
        let publisher = Arc::new(SessionPublisher::start(Arc::clone(&backend), config));
        let hydrator = ProfileHydrator::new(store, config);
        Self::with_parts(backend, publisher, hydrator, config)
    }

    /// Build on an existing publisher (shared with other observers).
    pub fn with_parts(
        backend: Arc<dyn IdentityBackend>,
        publisher: Arc<SessionPublisher>,
        hydrator: ProfileHydrator,
        config: &SessionConfig,
    ) -> Self {
        let subscription = publisher.subscribe();
        let engine = Arc::new(Engine {
            backend,
            publisher,
            hydrator,
            config: config.clone(),
            cell: watch::channel(SessionSnapshot::initial()).0,
            stopped: AtomicBool::new(false),
        });
        let consumer = tokio::spawn(consume(Arc::clone(&engine), subscription));
        Self { engine, consumer }
    }

    pub fn publisher(&self) -> &Arc<SessionPublisher> {
        &self.engine.publisher
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────

    /// Sign in and install the hydrated profile.
    ///
    /// On a missing profile this fails with `ProfileNotFound` and the
    /// orchestrator stays unauthenticated, even though the backend session
    /// is live. A session whose claims this device rejects fails with
    /// `UnusableSession`. A transient profile read failure keeps a user
    /// already installed for the same session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<Profile>, SessionError> {
        self.ensure_running()?;
        let credentials = Credentials::new(email, password)?;
        tracing::info!(email = %credentials.email(), "signing in");

        let engine = &self.engine;
        let observed = self.settled_sequence().await;
        engine.mark_authenticating();

        let session = match engine.bounded("sign-in", engine.backend.sign_in(&credentials)).await {
            Ok(session) => session,
            Err(err) => {
                engine.abandon_authenticating();
                tracing::warn!(error = %err, "sign-in rejected");
                return Err(err.into());
            }
        };

        if let Err(err) = engine.usable(&session) {
            engine.abandon_authenticating();
            return Err(err);
        }

        let ticket = engine.join(session.identity_id(), observed).await?;
        match engine.hydrator.hydrate(&ticket.identity_id).await {
            Ok(profile) => engine.install(&ticket, profile).ok_or(SessionError::Superseded),
            Err(HydrateError::NotFound(id)) => {
                tracing::warn!(identity = %id, "signed in without a profile");
                engine.fail(&ticket, true);
                Err(SessionError::ProfileNotFound(id))
            }
            Err(err) => {
                // A concurrent hydration for the same session may already
                // have installed the user.
                engine.fail(&ticket, false);
                if let Some(user) = engine.installed(&ticket) {
                    tracing::debug!(
                        identity = %ticket.identity_id,
                        error = %err,
                        "profile read failed; keeping installed user"
                    );
                    return Ok(user);
                }
                tracing::warn!(
                    identity = %ticket.identity_id,
                    error = %err,
                    "signed in without a usable profile"
                );
                Err(err.into())
            }
        }
    }

    /// Create an identity and its profile, then install the profile.
    ///
    /// If the identity is created but the profile insert fails, the
    /// identity is left orphaned (logged at error level) and the call fails.
    pub async fn sign_up(&self, fields: NewProfile, password: &str) -> Result<Arc<Profile>, SessionError> {
        self.ensure_running()?;
        let checked = fields.validate()?;
        let credentials = Credentials::from_parts(checked.email, password);
        tracing::info!(email = %credentials.email(), role = ?fields.role, "signing up");

        let engine = &self.engine;
        let observed = self.settled_sequence().await;
        engine.mark_authenticating();

        let session = match engine.bounded("sign-up", engine.backend.sign_up(&credentials)).await {
            Ok(session) => session,
            Err(err) => {
                engine.abandon_authenticating();
                tracing::warn!(error = %err, "sign-up rejected");
                return Err(err.into());
            }
        };
        let id = session.identity_id().clone();

        let profile = match engine.hydrator.create_profile(&id, &fields).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::error!(
                    identity = %id,
                    email = %credentials.email(),
                    error = %err,
                    "profile creation failed after the identity was created; identity is orphaned"
                );
                engine.abandon_authenticating();
                engine.reject_identity(&id);
                return Err(err.into());
            }
        };

        if let Err(err) = engine.usable(&session) {
            engine.abandon_authenticating();
            return Err(err);
        }

        let ticket = engine.join(&id, observed).await?;
        engine.install(&ticket, profile).ok_or(SessionError::Superseded)
    }

    /// Ask the backend to end the session. Local state is torn down when
    /// the resulting signed-out state is published.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.ensure_running()?;
        tracing::info!("signing out");
        let engine = &self.engine;
        engine.bounded("sign-out", engine.backend.sign_out()).await?;
        Ok(())
    }

    /// Re-read the current user's profile (e.g. after an edit elsewhere).
    /// Returns `None` when no session is live.
    pub async fn refresh_current_user(&self) -> Result<Option<Arc<Profile>>, SessionError> {
        self.ensure_running()?;
        let Some(ticket) = self.engine.cell.borrow().ticket() else {
            return Ok(None);
        };
        match self.engine.hydrator.hydrate(&ticket.identity_id).await {
            Ok(profile) => self
                .engine
                .install(&ticket, profile)
                .map(Some)
                .ok_or(SessionError::Superseded),
            Err(err) => {
                self.engine.fail(&ticket, false);
                Err(err.into())
            }
        }
    }

    /// Stop reacting to backend changes. The last snapshot stays readable.
    pub fn shutdown(&self) {
        if !self.engine.stopped.swap(true, Ordering::SeqCst) {
            tracing::info!("session orchestrator shutting down");
        }
        self.consumer.abort();
        self.engine.publisher.shutdown();
    }

    pub fn is_running(&self) -> bool {
        !self.engine.stopped.load(Ordering::SeqCst) && !self.consumer.is_finished()
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(SessionError::EngineStopped)
        }
    }

    /// Wait for bootstrap, then return the publisher sequence the consumer
    /// has applied.
    async fn settled_sequence(&self) -> u64 {
        let engine = &self.engine;
        let ready = engine.publisher.wait_initialized();
        if tokio::time::timeout(engine.config.bootstrap_timeout, ready).await.is_err() {
            tracing::warn!("session bootstrap still pending");
        }
        let sequence = engine.publisher.current().0;
        engine.caught_up(sequence).await;
        sequence
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        self.engine.snapshot()
    }

    pub fn current_user(&self) -> Option<Arc<Profile>> {
        self.engine.cell.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.engine.cell.borrow().is_authenticated()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.engine.cell.subscribe()
    }

    /// Resolve with the first snapshot matching `predicate`.
    pub async fn wait_until(&self, predicate: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
        let mut rx = self.watch();
        match rx.wait_for(predicate).await {
            Ok(snap) => snap.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Resolve once the bootstrap state has been applied.
    pub async fn wait_initialized(&self) -> SessionSnapshot {
        self.wait_until(|snap| snap.sequence > 0).await
    }

    /// Current user, emitting the present value first and then each change.
    pub fn current_user_stream(&self) -> impl Stream<Item = Option<Arc<Profile>>> + Send + 'static {
        let mut last: Option<Option<Arc<Profile>>> = None;
        WatchStream::new(self.watch()).filter_map(move |snap| {
            if last.as_ref() == Some(&snap.user) {
                return None;
            }
            last = Some(snap.user.clone());
            Some(snap.user)
        })
    }

    /// Authentication flag, emitting the present value first and then each change.
    pub fn authenticated_stream(&self) -> impl Stream<Item = bool> + Send + 'static {
        let mut last = None;
        WatchStream::new(self.watch()).filter_map(move |snap| {
            let authenticated = snap.is_authenticated();
            if last == Some(authenticated) {
                return None;
            }
            last = Some(authenticated);
            Some(authenticated)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Navigation
    // ─────────────────────────────────────────────────────────────────────

    pub fn landing_route(&self) -> &'static str {
        route_for(self.engine.cell.borrow().navigation_role())
    }

    pub fn landing_title(&self) -> &'static str {
        title_for(self.engine.cell.borrow().navigation_role())
    }

    pub fn menu(&self) -> Arc<[NavigationEntry]> {
        menu_for(self.engine.cell.borrow().navigation_role())
    }

    /// Route-guard decision for `path` given the live session.
    pub fn guard(&self, path: &str) -> GuardDecision {
        let snap = self.engine.cell.borrow();
        guard(snap.is_authenticated(), snap.role(), path)
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.consumer.abort();
    }
}
