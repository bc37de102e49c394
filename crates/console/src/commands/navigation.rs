//! Static navigation queries (no session involved).

use serde::Serialize;

use venue_auth::{Role, explain_access, menu_for, route_for, title_for};

use super::emit;

#[derive(Serialize)]
struct Landing {
    role: Option<Role>,
    route: &'static str,
    title: &'static str,
}

/// Landing route and title for every role, plus the no-role fallback.
pub fn routes() -> anyhow::Result<()> {
    let rows: Vec<Landing> = Role::ALL
        .into_iter()
        .map(Some)
        .chain(std::iter::once(None))
        .map(|role| Landing {
            role,
            route: route_for(role),
            title: title_for(role),
        })
        .collect();
    emit(&rows)
}

pub fn menu(role: Role) -> anyhow::Result<()> {
    emit(&menu_for(Some(role))[..])
}

pub fn access(role: Option<Role>, path: &str) -> anyhow::Result<()> {
    emit(&explain_access(role, path))
}
