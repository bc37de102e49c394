//! Role-driven navigation menu.
//!
//! Menus are fixed per role, so they are built once per role and shared for
//! the rest of the process. No invalidation exists or is needed.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use serde::Serialize;

use crate::Role;
use crate::navigation::{ANONYMOUS_ROUTE, LOGIN_ROUTE};

/// One entry of the side navigation.
///
/// Entries without a route are actions handled by the shell (sign out).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationEntry {
    pub id: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    pub route: Option<&'static str>,
}

const fn link(
    id: &'static str,
    label: &'static str,
    icon: &'static str,
    route: &'static str,
) -> NavigationEntry {
    NavigationEntry {
        id,
        label,
        icon,
        route: Some(route),
    }
}

const SIGN_OUT: NavigationEntry = NavigationEntry {
    id: "sign-out",
    label: "Sign out",
    icon: "log-out",
    route: None,
};

fn entries(role: Role) -> Vec<NavigationEntry> {
    match role {
        Role::Owner => vec![
            link("home", "Home", "home", "/dashboard/owner"),
            link("employees", "Employees", "people", "/dashboard/owner/employees"),
            link("register-employee", "Register employee", "person-add", "/dashboard/owner/employees/new"),
            link("tables", "Tables", "grid", "/dashboard/owner/tables"),
            link("reports", "Reports", "stats-chart", "/dashboard/owner/reports"),
            SIGN_OUT,
        ],
        Role::Supervisor => vec![
            link("home", "Home", "home", "/dashboard/supervisor"),
            link("staff", "Staff", "people", "/dashboard/supervisor/staff"),
            link("customers", "Customers", "person", "/dashboard/supervisor/customers"),
            link("tables", "Tables", "grid", "/dashboard/supervisor/tables"),
            SIGN_OUT,
        ],
        Role::Maitre => vec![
            link("home", "Home", "home", "/dashboard/maitre"),
            link("waitlist", "Waitlist", "list", "/dashboard/maitre/waitlist"),
            link("tables", "Assign tables", "grid", "/dashboard/maitre/tables"),
            SIGN_OUT,
        ],
        Role::Waiter => vec![
            link("home", "Home", "home", "/dashboard/waiter"),
            link("tables", "My tables", "grid", "/dashboard/waiter/tables"),
            link("orders", "Orders", "receipt", "/dashboard/waiter/orders"),
            SIGN_OUT,
        ],
        Role::Cook => vec![
            link("home", "Home", "home", "/dashboard/cook"),
            link("kitchen-queue", "Kitchen queue", "restaurant", "/dashboard/cook/orders"),
            SIGN_OUT,
        ],
        Role::Bartender => vec![
            link("home", "Home", "home", "/dashboard/bartender"),
            link("bar-queue", "Bar queue", "wine", "/dashboard/bartender/orders"),
            SIGN_OUT,
        ],
        Role::RegisteredCustomer => vec![
            link("home", "Home", "home", "/dashboard/customer"),
            link("menu", "Menu", "book", "/dashboard/customer/menu"),
            link("my-orders", "My orders", "receipt", "/dashboard/customer/orders"),
            SIGN_OUT,
        ],
        Role::AnonymousCustomer => vec![
            link("menu", "Menu", "book", ANONYMOUS_ROUTE),
            link("sign-in", "Sign in", "log-in", LOGIN_ROUTE),
            link("register", "Create account", "person-add", "/register"),
        ],
    }
}

/// Memoizing menu builder.
#[derive(Debug)]
pub struct MenuGenerator {
    cache: RwLock<HashMap<Role, Arc<[NavigationEntry]>>>,
    empty: Arc<[NavigationEntry]>,
}

impl MenuGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered entries for `role`; an absent role has no menu.
    pub fn menu_for(&self, role: Option<Role>) -> Arc<[NavigationEntry]> {
        let Some(role) = role else {
            return Arc::clone(&self.empty);
        };

        if let Some(hit) = self.cache.read().ok().and_then(|c| c.get(&role).cloned()) {
            return hit;
        }

        match self.cache.write() {
            Ok(mut cache) => Arc::clone(
                cache
                    .entry(role)
                    .or_insert_with(|| Arc::from(entries(role))),
            ),
            // Lock poisoned: still answer, just without caching.
            Err(_) => Arc::from(entries(role)),
        }
    }

    pub fn cached_roles(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for MenuGenerator {
    fn default() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            empty: Arc::from(Vec::new()),
        }
    }
}

static MENUS: LazyLock<MenuGenerator> = LazyLock::new(MenuGenerator::new);

/// Process-wide memoized menu for `role`.
pub fn menu_for(role: Option<Role>) -> Arc<[NavigationEntry]> {
    MENUS.menu_for(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::has_access;

    #[test]
    fn repeated_calls_share_the_same_menu() {
        for role in Role::ALL {
            let a = menu_for(Some(role));
            let b = menu_for(Some(role));
            assert!(Arc::ptr_eq(&a, &b));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn absent_role_has_empty_menu() {
        assert!(menu_for(None).is_empty());
        assert!(Arc::ptr_eq(&menu_for(None), &menu_for(None)));
    }

    #[test]
    fn home_comes_first_except_for_anonymous() {
        for role in Role::ALL {
            let menu = menu_for(Some(role));
            assert!(!menu.is_empty());
            if role == Role::AnonymousCustomer {
                assert!(menu.iter().all(|e| e.id != "home"));
            } else {
                assert_eq!(menu[0].id, "home");
            }
        }
    }

    #[test]
    fn every_route_in_a_menu_is_reachable_by_its_role() {
        for role in Role::ALL {
            for entry in menu_for(Some(role)).iter() {
                if let Some(route) = entry.route {
                    assert!(has_access(Some(role), route), "{role:?} cannot reach {route}");
                }
            }
        }
    }

    #[test]
    fn entry_ids_are_unique_per_role() {
        for role in Role::ALL {
            let menu = menu_for(Some(role));
            let mut ids: Vec<_> = menu.iter().map(|e| e.id).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), menu.len());
        }
    }

    #[test]
    fn generator_builds_each_role_once() {
        let generator = MenuGenerator::new();
        assert_eq!(generator.cached_roles(), 0);
        generator.menu_for(Some(Role::Cook));
        generator.menu_for(Some(Role::Cook));
        generator.menu_for(None);
        assert_eq!(generator.cached_roles(), 1);
    }
}
