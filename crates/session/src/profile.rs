//! Profile records and sign-in/up input types.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

use venue_auth::{Role, route_for};
use venue_core::{DocumentNumber, DomainError, DomainResult, Email, Entity, IdentityId};

/// Application-level record for a person, keyed by the identity id.
///
/// Never exists without a corresponding identity; the reverse can happen
/// (orphaned identity after a failed sign-up).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: IdentityId,
    pub first_name: String,
    pub last_name: String,
    pub document_number: DocumentNumber,
    pub email: Email,

    /// `None` when the stored role is missing or not one this build knows.
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: Option<Role>,

    #[serde(default)]
    pub photo_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Profile {
    type Id = IdentityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Profile {
    /// Build the row to insert for a freshly created identity.
    pub fn from_new(id: IdentityId, fields: &NewProfile, now: DateTime<Utc>) -> DomainResult<Self> {
        let checked = fields.validate()?;
        Ok(Self {
            id,
            first_name: fields.first_name.trim().to_string(),
            last_name: fields.last_name.trim().to_string(),
            document_number: checked.document_number,
            email: checked.email,
            role: fields.role,
            photo_url: fields.photo_url.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn landing_route(&self) -> &'static str {
        route_for(self.role)
    }
}

/// Unknown or anonymous stored roles degrade to "no role" instead of failing
/// the whole record.
fn lenient_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value.parse::<Role>() {
        Ok(role) if role.has_profile() => Some(role),
        Ok(role) => {
            tracing::warn!(role = role.as_str(), "stored profile carries a role without profiles; ignoring it");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "stored profile role not recognized; treating as no role");
            None
        }
    }))
}

/// Fields supplied at sign-up. Timestamps and id are assigned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub first_name: String,
    pub last_name: String,
    pub document_number: i64,
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Parsed values of a [`NewProfile`] that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedProfile {
    pub email: Email,
    pub document_number: DocumentNumber,
}

impl NewProfile {
    pub fn validate(&self) -> DomainResult<CheckedProfile> {
        if self.first_name.trim().is_empty() {
            return Err(DomainError::validation("first name cannot be empty"));
        }
        if self.last_name.trim().is_empty() {
            return Err(DomainError::validation("last name cannot be empty"));
        }
        if let Some(role) = self.role {
            if !role.has_profile() {
                return Err(DomainError::validation(format!(
                    "role {role} cannot own a profile"
                )));
            }
        }

        Ok(CheckedProfile {
            email: Email::parse(&self.email)?,
            document_number: DocumentNumber::new(self.document_number)?,
        })
    }
}

/// Email + password pair. The password is redacted from `Debug` output.
#[derive(Debug)]
pub struct Credentials {
    email: Email,
    password: SecretString,
}

impl Credentials {
    pub fn new(email: &str, password: impl Into<String>) -> DomainResult<Self> {
        Ok(Self::from_parts(Email::parse(email)?, password))
    }

    pub fn from_parts(email: Email, password: impl Into<String>) -> Self {
        Self {
            email,
            password: SecretString::from(password.into()),
        }
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}
