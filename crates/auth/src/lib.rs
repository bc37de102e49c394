//! `venue-auth`: pure role-based access boundary.
//!
//! This crate is intentionally decoupled from the identity backend, storage
//! and rendering. Everything here is a deterministic function of a `Role`.

pub mod claims;
pub mod menu;
pub mod navigation;
pub mod roles;

pub use claims::{ClaimsError, SessionClaims, validate_claims};
pub use menu::{MenuGenerator, NavigationEntry, menu_for};
pub use navigation::{
    AccessExplanation, DenialKind, GuardDecision, RouteDefinition, explain_access, guard,
    has_access, route_for, title_for,
};
pub use roles::{Role, UnknownRole};
