use serde::Serialize;

use crate::Role;

/// Landing route for sessions without a role (anonymous browsing).
pub const ANONYMOUS_ROUTE: &str = "/menu";

/// Title shown on the anonymous landing route.
pub const ANONYMOUS_TITLE: &str = "Menu";

/// Where unauthenticated visitors of a protected route are sent.
pub const LOGIN_ROUTE: &str = "/login";

/// Routes every visitor may open regardless of role.
pub const PUBLIC_ROUTES: [&str; 2] = [LOGIN_ROUTE, "/register"];

/// One row of the static role table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteDefinition {
    pub role: Role,
    pub path: &'static str,
    pub title: &'static str,
}

/// Dashboard per profile-backed role. `AnonymousCustomer` is handled
/// outside the table.
pub const ROLE_TABLE: [RouteDefinition; 7] = [
    RouteDefinition { role: Role::Owner, path: "/dashboard/owner", title: "Owner Dashboard" },
    RouteDefinition { role: Role::Supervisor, path: "/dashboard/supervisor", title: "Supervisor Dashboard" },
    RouteDefinition { role: Role::Maitre, path: "/dashboard/maitre", title: "Maitre Dashboard" },
    RouteDefinition { role: Role::Waiter, path: "/dashboard/waiter", title: "Waiter Dashboard" },
    RouteDefinition { role: Role::Cook, path: "/dashboard/cook", title: "Cook Dashboard" },
    RouteDefinition { role: Role::Bartender, path: "/dashboard/bartender", title: "Bartender Dashboard" },
    RouteDefinition { role: Role::RegisteredCustomer, path: "/dashboard/customer", title: "Customer Dashboard" },
];

pub fn route_definition(role: Role) -> Option<&'static RouteDefinition> {
    ROLE_TABLE.iter().find(|def| def.role == role)
}

/// Landing route for a role.
///
/// Total: an absent role (no session, or a stored role this build does not
/// recognize) lands on the anonymous route, never on a staff dashboard.
pub fn route_for(role: Option<Role>) -> &'static str {
    role.and_then(route_definition)
        .map(|def| def.path)
        .unwrap_or(ANONYMOUS_ROUTE)
}

/// Display title for a role's landing route. Same totality as [`route_for`].
pub fn title_for(role: Option<Role>) -> &'static str {
    role.and_then(route_definition)
        .map(|def| def.title)
        .unwrap_or(ANONYMOUS_TITLE)
}

/// Whether `role` may open `requested_path`.
///
/// Granted iff the normalized path is public, equals the role's landing
/// route, or is nested under it (`/dashboard/cook/orders` for `Cook`).
/// Sibling prefixes do not match (`/dashboard/cooking` is not under
/// `/dashboard/cook`).
///
/// - No IO
/// - No panics
pub fn has_access(role: Option<Role>, requested_path: &str) -> bool {
    explain_access(role, requested_path).granted
}

/// Outcome of a route guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "route", rename_all = "snake_case")]
pub enum GuardDecision {
    Allow,
    RedirectToLogin,
    RedirectTo(&'static str),
}

/// Decide what navigation to `path` should do for the current session.
///
/// Unauthenticated visitors may open public routes and the anonymous menu;
/// anything else sends them to the login route. Authenticated users who
/// lack access are sent back to their own landing route.
pub fn guard(authenticated: bool, role: Option<Role>, path: &str) -> GuardDecision {
    if !authenticated {
        return if has_access(None, path) {
            GuardDecision::Allow
        } else {
            GuardDecision::RedirectToLogin
        };
    }

    if has_access(role, path) {
        GuardDecision::Allow
    } else {
        GuardDecision::RedirectTo(route_for(role))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Access Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessExplanation {
    pub role: Option<Role>,
    pub requested_path: String,
    /// `None` when the path could not be normalized (e.g. it climbs above `/`).
    pub normalized_path: Option<String>,
    pub landing_route: &'static str,
    pub granted: bool,
    pub reason: String,
    pub denial: Option<DenialKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    MalformedPath,
    OutsideRoleScope,
}

/// Explain why `role` may or may not open `requested_path`.
pub fn explain_access(role: Option<Role>, requested_path: &str) -> AccessExplanation {
    let landing_route = route_for(role);

    let Some(normalized) = normalize_path(requested_path) else {
        return AccessExplanation {
            role,
            requested_path: requested_path.to_string(),
            normalized_path: None,
            landing_route,
            granted: false,
            reason: format!("path '{requested_path}' does not resolve inside the application"),
            denial: Some(DenialKind::MalformedPath),
        };
    };

    let (granted, reason) = if PUBLIC_ROUTES.contains(&normalized.as_str()) {
        (true, format!("'{normalized}' is a public route"))
    } else if is_scoped_under(landing_route, &normalized) {
        (
            true,
            format!("'{normalized}' is within the landing route '{landing_route}'"),
        )
    } else {
        (
            false,
            format!(
                "'{normalized}' is outside the landing route '{landing_route}' for {}",
                role.map(|r| r.as_str()).unwrap_or("an anonymous session")
            ),
        )
    };

    AccessExplanation {
        role,
        requested_path: requested_path.to_string(),
        normalized_path: Some(normalized),
        landing_route,
        granted,
        reason,
        denial: (!granted).then_some(DenialKind::OutsideRoleScope),
    }
}

fn is_scoped_under(route: &str, path: &str) -> bool {
    match path.strip_prefix(route) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Strip query/fragment, collapse empty and `.` segments and resolve `..`.
///
/// Returns `None` if `..` would climb above the root.
fn normalize_path(raw: &str) -> Option<String> {
    let path = raw
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim();

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    Some(format!("/{}", segments.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn all_roles() -> impl Iterator<Item = Option<Role>> {
        Role::ALL.into_iter().map(Some).chain(std::iter::once(None))
    }

    #[test]
    fn route_and_title_are_total() {
        for role in all_roles() {
            assert!(!route_for(role).is_empty());
            assert!(!title_for(role).is_empty());
        }
    }

    #[test]
    fn every_role_reaches_its_landing_route() {
        for role in all_roles() {
            assert!(has_access(role, route_for(role)), "{role:?}");
        }
    }

    #[test]
    fn absent_role_falls_back_to_anonymous_route() {
        assert_eq!(route_for(None), ANONYMOUS_ROUTE);
        assert_eq!(route_for(Some(Role::AnonymousCustomer)), ANONYMOUS_ROUTE);
        assert!(!has_access(None, "/dashboard/owner"));
    }

    #[test]
    fn waiter_lands_on_waiter_dashboard() {
        assert_eq!(route_for(Some(Role::Waiter)), "/dashboard/waiter");
        assert_eq!(title_for(Some(Role::Waiter)), "Waiter Dashboard");
    }

    #[test]
    fn nested_routes_are_in_scope() {
        assert!(has_access(Some(Role::Cook), "/dashboard/cook/orders"));
        assert!(has_access(Some(Role::Cook), "/dashboard/cook/"));
        assert!(has_access(Some(Role::Cook), "/dashboard/cook?tab=queue"));
    }

    #[test]
    fn sibling_prefixes_are_not_in_scope() {
        assert!(!has_access(Some(Role::Cook), "/dashboard/cooking"));
        assert!(!has_access(Some(Role::Waiter), "/x/dashboard/waiter"));
    }

    #[test]
    fn dot_segments_cannot_escape_scope() {
        assert!(!has_access(Some(Role::Cook), "/dashboard/cook/../owner"));
        assert!(has_access(Some(Role::Cook), "/dashboard/owner/../cook/orders"));

        let exp = explain_access(Some(Role::Cook), "/../../etc");
        assert!(!exp.granted);
        assert_eq!(exp.denial, Some(DenialKind::MalformedPath));
    }

    #[test]
    fn public_routes_are_open_to_everyone() {
        for role in all_roles() {
            for path in PUBLIC_ROUTES {
                assert!(has_access(role, path));
            }
        }
    }

    #[test]
    fn guard_redirects_unauthenticated_visitors_to_login() {
        assert_eq!(
            guard(false, None, "/dashboard/owner"),
            GuardDecision::RedirectToLogin
        );
        assert_eq!(guard(false, None, "/menu"), GuardDecision::Allow);
        assert_eq!(guard(false, None, "/login"), GuardDecision::Allow);
    }

    #[test]
    fn guard_sends_authenticated_users_home_when_denied() {
        assert_eq!(
            guard(true, Some(Role::Waiter), "/dashboard/owner"),
            GuardDecision::RedirectTo("/dashboard/waiter")
        );
        assert_eq!(
            guard(true, Some(Role::Waiter), "/dashboard/waiter/tables"),
            GuardDecision::Allow
        );
    }

    #[test]
    fn explanation_reports_denial() {
        let exp = explain_access(Some(Role::Bartender), "/dashboard/owner");
        assert!(!exp.granted);
        assert_eq!(exp.denial, Some(DenialKind::OutsideRoleScope));
        assert_eq!(exp.landing_route, "/dashboard/bartender");
        assert_eq!(exp.normalized_path.as_deref(), Some("/dashboard/owner"));
    }

    fn any_role() -> impl Strategy<Value = Option<Role>> {
        prop::option::of(prop::sample::select(Role::ALL.to_vec()))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a role never reaches another role's dashboard.
        #[test]
        fn roles_do_not_reach_foreign_dashboards(
            role in any_role(),
            other in prop::sample::select(ROLE_TABLE.to_vec()),
            suffix in "[a-z/]{0,12}",
        ) {
            prop_assume!(Some(other.role) != role);
            let path = format!("{}/{}", other.path, suffix);
            prop_assert!(!has_access(role, &path));
        }

        /// Property: anything under the landing route stays accessible.
        #[test]
        fn landing_route_subtree_is_accessible(
            role in any_role(),
            suffix in "[a-z0-9]{1,8}(/[a-z0-9]{1,8}){0,3}",
        ) {
            let path = format!("{}/{}", route_for(role), suffix);
            prop_assert!(has_access(role, &path));
        }
    }
}
