use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operational category of a person using the venue client.
///
/// The set is closed: navigation, landing routes and menus are total over
/// it. A profile's role is fixed at creation. `AnonymousCustomer` never has
/// a backing profile; it stands for "no session".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Supervisor,
    Maitre,
    Waiter,
    Cook,
    Bartender,
    RegisteredCustomer,
    AnonymousCustomer,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Owner,
        Role::Supervisor,
        Role::Maitre,
        Role::Waiter,
        Role::Cook,
        Role::Bartender,
        Role::RegisteredCustomer,
        Role::AnonymousCustomer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "Owner",
            Role::Supervisor => "Supervisor",
            Role::Maitre => "Maitre",
            Role::Waiter => "Waiter",
            Role::Cook => "Cook",
            Role::Bartender => "Bartender",
            Role::RegisteredCustomer => "RegisteredCustomer",
            Role::AnonymousCustomer => "AnonymousCustomer",
        }
    }

    /// Venue employees (including the owner).
    pub fn is_staff(&self) -> bool {
        !self.is_customer()
    }

    pub fn is_customer(&self) -> bool {
        matches!(self, Role::RegisteredCustomer | Role::AnonymousCustomer)
    }

    /// Whether a profile record can carry this role.
    pub fn has_profile(&self) -> bool {
        *self != Role::AnonymousCustomer
    }

    /// Parse the role picked on the employee registration form.
    ///
    /// Only roles an owner may hire are accepted (case-insensitive). Unknown
    /// input is rejected rather than mapped to a default role.
    pub fn parse_staff(raw: &str) -> Option<Role> {
        let role = raw.trim().parse::<Role>().ok()?;
        match role {
            Role::Supervisor | Role::Maitre | Role::Waiter | Role::Cook | Role::Bartender => {
                Some(role)
            }
            _ => None,
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_round_trips_every_role() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn from_str_is_case_insensitive() {
        assert_eq!("waiter".parse::<Role>().unwrap(), Role::Waiter);
        assert_eq!("BARTENDER".parse::<Role>().unwrap(), Role::Bartender);
    }

    #[test]
    fn from_str_rejects_unknown() {
        let err = "Janitor".parse::<Role>().unwrap_err();
        assert_eq!(err, UnknownRole("Janitor".to_string()));
    }

    #[test]
    fn parse_staff_accepts_hireable_roles_only() {
        assert_eq!(Role::parse_staff(" cook "), Some(Role::Cook));
        assert_eq!(Role::parse_staff("maitre"), Some(Role::Maitre));
        assert_eq!(Role::parse_staff("owner"), None);
        assert_eq!(Role::parse_staff("RegisteredCustomer"), None);
        assert_eq!(Role::parse_staff("dishwasher"), None);
    }

    #[test]
    fn staff_and_customer_partition_roles() {
        for role in Role::ALL {
            assert_ne!(role.is_staff(), role.is_customer());
        }
        assert!(!Role::AnonymousCustomer.has_profile());
        assert!(Role::RegisteredCustomer.has_profile());
    }

    #[test]
    fn serializes_as_variant_name() {
        assert_eq!(serde_json::to_string(&Role::Waiter).unwrap(), "\"Waiter\"");
    }
}
