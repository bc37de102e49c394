//! Normalized session-state stream.
//!
//! Turns the backend's raw change notifications into a replay-latest stream
//! of [`SessionState`]. Late subscribers immediately see the current value.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use venue_core::IdentityId;
use venue_events::{EventBus, InMemoryEventBus, Subscription, SubscriptionId};

use crate::backend::{BackendSession, IdentityBackend, RawSessionEvent};
use crate::config::SessionConfig;

/// Whether an identity session is active, and for whom.
///
/// `identity_id` is present iff `authenticated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    authenticated: bool,
    identity_id: Option<IdentityId>,
}

impl SessionState {
    pub fn signed_out() -> Self {
        Self {
            authenticated: false,
            identity_id: None,
        }
    }

    pub fn signed_in(id: IdentityId) -> Self {
        Self {
            authenticated: true,
            identity_id: Some(id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn identity_id(&self) -> Option<&IdentityId> {
        self.identity_id.as_ref()
    }

    /// Map a backend session onto a state. Sessions whose claims are not
    /// valid at `now` (within `leeway` of clock skew) count as signed out.
    pub fn from_session(
        session: Option<&BackendSession>,
        now: DateTime<Utc>,
        leeway: chrono::Duration,
    ) -> Self {
        let Some(session) = session else {
            return Self::signed_out();
        };
        match session.validate(now, leeway) {
            Ok(()) => Self::signed_in(session.identity_id().clone()),
            Err(err) => {
                tracing::warn!(
                    identity = %session.identity_id(),
                    error = %err,
                    "backend reported an unusable session; treating as signed out"
                );
                Self::signed_out()
            }
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::signed_out()
    }
}

#[derive(Debug)]
struct Shared {
    bus: InMemoryEventBus<SessionState>,
    current: RwLock<(u64, SessionState)>,
    initialized: watch::Sender<bool>,
}

impl Shared {
    /// `current` stays locked across the publish so readers never observe
    /// a sequence the bus has not delivered yet, or vice versa.
    fn publish(&self, state: SessionState) {
        let mut current = match self.current.write() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        match self.bus.publish(state.clone()) {
            Ok(sequence) => *current = (sequence, state),
            Err(err) => tracing::error!(error = %err, "failed to publish session state"),
        }
    }
}

/// Replay-latest publisher of [`SessionState`].
///
/// Owns a background task that bootstraps from the backend's persisted
/// session and then forwards every raw change in order. Dropping the
/// publisher stops the task and closes every subscription.
#[derive(Debug)]
pub struct SessionPublisher {
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

impl SessionPublisher {
    /// Start publishing. Must be called from within a Tokio runtime.
    ///
    /// The raw event listener is registered before the bootstrap query, so
    /// no change that happens during bootstrap is lost. Events queued
    /// meanwhile are applied after the bootstrap value, in order.
    pub fn start(backend: Arc<dyn IdentityBackend>, config: &SessionConfig) -> Self {
        let events = backend.session_events();

        let shared = Arc::new(Shared {
            bus: InMemoryEventBus::replaying(),
            current: RwLock::new((0, SessionState::signed_out())),
            initialized: watch::channel(false).0,
        });

        let pump = tokio::spawn(pump(
            Arc::clone(&shared),
            backend,
            events,
            config.bootstrap_timeout,
            config.claims_leeway(),
        ));

        Self { shared, pump }
    }

    /// Latest published state; signed out until bootstrap completes.
    pub fn current_value(&self) -> SessionState {
        self.current().1
    }

    /// Latest published state with its sequence number (0 before bootstrap).
    pub fn current(&self) -> (u64, SessionState) {
        match self.shared.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Subscribe to state changes. Once bootstrap has completed, the first
    /// delivered envelope is the current state.
    pub fn subscribe(&self) -> Subscription<SessionState> {
        self.shared.bus.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.bus.subscriber_count()
    }

    pub fn is_initialized(&self) -> bool {
        *self.shared.initialized.borrow()
    }

    /// Resolve once the bootstrap value has been published.
    pub async fn wait_initialized(&self) {
        let mut rx = self.shared.initialized.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Stop forwarding backend changes. Subscribers keep the last state.
    pub fn shutdown(&self) {
        self.pump.abort();
    }
}

impl Drop for SessionPublisher {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump(
    shared: Arc<Shared>,
    backend: Arc<dyn IdentityBackend>,
    mut events: mpsc::UnboundedReceiver<RawSessionEvent>,
    bootstrap_timeout: Duration,
    leeway: chrono::Duration,
) {
    let bootstrap = match tokio::time::timeout(bootstrap_timeout, backend.current_session()).await {
        Ok(Ok(session)) => SessionState::from_session(session.as_ref(), Utc::now(), leeway),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "session bootstrap failed; starting signed out");
            SessionState::signed_out()
        }
        Err(_) => {
            tracing::warn!(timeout = ?bootstrap_timeout, "session bootstrap timed out; starting signed out");
            SessionState::signed_out()
        }
    };

    tracing::debug!(authenticated = bootstrap.is_authenticated(), "session bootstrap complete");
    shared.publish(bootstrap);
    shared.initialized.send_replace(true);

    while let Some(raw) = events.recv().await {
        let state = SessionState::from_session(raw.session.as_ref(), Utc::now(), leeway);
        tracing::debug!(
            kind = ?raw.kind,
            authenticated = state.is_authenticated(),
            "session change"
        );
        shared.publish(state);
    }

    tracing::debug!("identity backend closed its event stream");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryIdentityBackend;
    use crate::profile::Credentials;
    use chrono::Duration as ChronoDuration;
    use venue_auth::SessionClaims;
    use venue_core::Email;

    fn start(backend: &Arc<InMemoryIdentityBackend>) -> SessionPublisher {
        SessionPublisher::start(backend.clone(), &SessionConfig::default())
    }

    #[tokio::test]
    async fn bootstraps_signed_out_without_persisted_session() {
        let backend = Arc::new(InMemoryIdentityBackend::new());
        let publisher = start(&backend);
        publisher.wait_initialized().await;

        assert!(publisher.is_initialized());
        assert_eq!(publisher.current_value(), SessionState::signed_out());
    }

    #[tokio::test]
    async fn bootstraps_from_persisted_session() {
        let backend = Arc::new(InMemoryIdentityBackend::new());
        let id = IdentityId::parse("id-1").unwrap();
        backend.restore_session(id.clone()).unwrap();

        let publisher = start(&backend);
        let mut sub = publisher.subscribe();
        let first = sub.recv().await.unwrap();
        assert_eq!(first.message(), &SessionState::signed_in(id));
    }

    #[tokio::test]
    async fn expired_persisted_session_counts_as_signed_out() {
        let backend = Arc::new(InMemoryIdentityBackend::new());
        let now = Utc::now();
        backend
            .restore_claims(SessionClaims::new(
                IdentityId::parse("id-1").unwrap(),
                now - ChronoDuration::hours(2),
                now - ChronoDuration::hours(1),
            ))
            .unwrap();

        let publisher = start(&backend);
        publisher.wait_initialized().await;
        assert_eq!(publisher.current_value(), SessionState::signed_out());
    }

    #[tokio::test]
    async fn bootstrap_failure_fails_closed() {
        let backend = Arc::new(InMemoryIdentityBackend::new());
        backend.restore_session(IdentityId::parse("id-1").unwrap()).unwrap();
        backend.set_unavailable(true);

        let publisher = start(&backend);
        publisher.wait_initialized().await;
        assert!(!publisher.current_value().is_authenticated());
    }

    #[tokio::test]
    async fn late_subscriber_receives_current_value_first() {
        let backend = Arc::new(InMemoryIdentityBackend::new());
        let email = Email::parse("ana@venue.test").unwrap();
        let id = backend.register_account(&email, "pw").unwrap();

        let publisher = start(&backend);
        publisher.wait_initialized().await;

        let mut early = publisher.subscribe();
        backend
            .sign_in(&Credentials::new("ana@venue.test", "pw").unwrap())
            .await
            .unwrap();

        // Early subscriber: replayed bootstrap, then the sign-in.
        assert_eq!(early.recv().await.unwrap().message(), &SessionState::signed_out());
        let signed_in = early.recv().await.unwrap();
        assert_eq!(signed_in.message(), &SessionState::signed_in(id.clone()));

        let mut late = publisher.subscribe();
        let replay = late.recv().await.unwrap();
        assert_eq!(replay.message(), &SessionState::signed_in(id));
        assert_eq!(replay.sequence(), signed_in.sequence());
    }

    #[tokio::test]
    async fn unsubscribed_listener_stops_receiving() {
        let backend = Arc::new(InMemoryIdentityBackend::new());
        let publisher = start(&backend);
        publisher.wait_initialized().await;

        let mut sub = publisher.subscribe();
        assert!(publisher.unsubscribe(sub.id()));
        assert!(!publisher.unsubscribe(sub.id()));

        // Only the replayed value was queued before removal.
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn every_raw_event_is_forwarded_in_order() {
        let backend = Arc::new(InMemoryIdentityBackend::new());
        let publisher = start(&backend);
        publisher.wait_initialized().await;
        let mut sub = publisher.subscribe();
        let bootstrap = sub.recv().await.unwrap();

        backend
            .sign_up(&Credentials::new("ana@venue.test", "pw").unwrap())
            .await
            .unwrap();
        backend.refresh_token().unwrap();
        backend.invalidate().unwrap();

        let mut last = bootstrap.sequence();
        let mut states = Vec::new();
        for _ in 0..3 {
            let env = sub.recv().await.unwrap();
            assert!(env.sequence() > last);
            last = env.sequence();
            states.push(env.into_message().is_authenticated());
        }
        assert_eq!(states, vec![true, true, false]);
    }

    #[tokio::test]
    async fn claims_issued_slightly_ahead_count_as_signed_in() {
        let backend = Arc::new(InMemoryIdentityBackend::new());
        let id = IdentityId::parse("id-1").unwrap();
        let now = Utc::now();
        backend
            .restore_claims(SessionClaims::new(
                id.clone(),
                now + ChronoDuration::seconds(2),
                now + ChronoDuration::hours(1),
            ))
            .unwrap();

        let publisher = start(&backend);
        publisher.wait_initialized().await;
        assert_eq!(publisher.current_value(), SessionState::signed_in(id));
    }

    #[tokio::test]
    async fn readers_recover_from_a_poisoned_state_lock() {
        let backend = Arc::new(InMemoryIdentityBackend::new());
        let publisher = start(&backend);
        publisher.wait_initialized().await;
        let (before, _) = publisher.current();

        let shared = Arc::clone(&publisher.shared);
        let _ = std::thread::spawn(move || {
            let _guard = shared.current.write().unwrap();
            panic!("poison the state lock");
        })
        .join();
        assert!(publisher.shared.current.is_poisoned());

        let id = IdentityId::parse("id-1").unwrap();
        publisher.shared.publish(SessionState::signed_in(id.clone()));

        let (sequence, state) = publisher.current();
        assert!(sequence > before);
        assert_eq!(state, SessionState::signed_in(id.clone()));
        assert_eq!(publisher.current_value(), SessionState::signed_in(id));
    }
}
