//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// An email address with a minimal structural check.
///
/// ## Constraints
///
/// - Length: 1-254 characters (RFC 5321 limit)
/// - Exactly one `@`, with non-empty local part and domain
///
/// The identity backend does the authoritative check; this only rejects
/// input that could never be a login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    pub fn parse(raw: &str) -> DomainResult<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(DomainError::validation("email cannot be empty"));
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(DomainError::validation(format!(
                "email must be at most {} characters",
                Self::MAX_LENGTH
            )));
        }

        let mut parts = s.split('@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next();
        if parts.next().is_some() {
            return Err(DomainError::validation("email must contain exactly one @"));
        }
        match domain {
            None => Err(DomainError::validation("email must contain an @ symbol")),
            Some(_) if local.is_empty() => {
                Err(DomainError::validation("email local part cannot be empty"))
            }
            Some("") => Err(DomainError::validation("email domain cannot be empty")),
            Some(_) => Ok(Self(s.to_owned())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Email {}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for Email {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// National identity document number printed on a profile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentNumber(i64);

impl DocumentNumber {
    pub fn new(value: i64) -> DomainResult<Self> {
        if value <= 0 {
            return Err(DomainError::validation("document number must be positive"));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl ValueObject for DocumentNumber {}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn email_accepts_plain_addresses() {
        assert!(Email::parse("a@x.com").is_ok());
        assert!(Email::parse("user.name+tag@domain.co.uk").is_ok());
    }

    #[test]
    fn email_trims_surrounding_whitespace() {
        assert_eq!(Email::parse("  a@x.com ").unwrap().as_str(), "a@x.com");
    }

    #[test]
    fn email_rejects_malformed_input() {
        for bad in ["", "no-at-symbol", "@domain.com", "user@", "a@b@c"] {
            assert!(Email::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn email_rejects_overlong_input() {
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(Email::parse(&long), Err(DomainError::Validation(_))));
    }

    #[test]
    fn document_number_must_be_positive() {
        assert!(DocumentNumber::new(0).is_err());
        assert!(DocumentNumber::new(-5).is_err());
        assert_eq!(DocumentNumber::new(30111222).unwrap().get(), 30111222);
    }

    proptest! {
        #[test]
        fn document_number_accepts_every_positive_value(n in 1i64..i64::MAX) {
            prop_assert_eq!(DocumentNumber::new(n).unwrap().get(), n);
        }
    }
}
