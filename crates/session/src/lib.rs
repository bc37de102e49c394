//! `venue-session`: identity-session synchronization engine.
//!
//! Keeps one consistent answer to "who is signed in and what is their
//! profile" while the identity backend reports session changes on its own
//! schedule.
//!
//! ```text
//! IdentityBackend ─▶ SessionPublisher ─▶ SessionOrchestrator ─▶ current user / navigation
//!                                              │
//!                      ProfileStore ◀─ ProfileHydrator
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod hydrator;
pub mod memory;
pub mod orchestrator;
pub mod profile;
pub mod publisher;

pub use backend::{BackendSession, IdentityBackend, ProfileStore, RawSessionEvent, SessionChangeKind};
pub use config::{ConfigError, SessionConfig};
pub use error::{BackendError, HydrateError, SessionError};
pub use hydrator::ProfileHydrator;
pub use memory::{InMemoryIdentityBackend, InMemoryProfileStore};
pub use orchestrator::{SessionOrchestrator, SessionPhase, SessionSnapshot};
pub use profile::{Credentials, NewProfile, Profile};
pub use publisher::{SessionPublisher, SessionState};
