//! Account fixtures loaded into the in-memory backend.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;

use venue_auth::Role;
use venue_core::Email;
use venue_session::{InMemoryIdentityBackend, InMemoryProfileStore, NewProfile, Profile};

const DEMO: &str = include_str!("../fixtures/demo.json");

#[derive(Debug, Deserialize)]
pub struct Fixtures {
    pub accounts: Vec<FixtureAccount>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureAccount {
    pub email: String,
    pub password: String,
    /// Accounts without a profile model orphaned identities.
    #[serde(default)]
    pub profile: Option<FixtureProfile>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureProfile {
    pub first_name: String,
    pub last_name: String,
    pub document_number: i64,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl Fixtures {
    /// Load from `path`, or the bundled demo accounts when `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading fixtures from {}", path.display()))?;
                Self::parse(&raw).with_context(|| format!("parsing fixtures in {}", path.display()))
            }
            None => Self::parse(DEMO).context("parsing bundled demo fixtures"),
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Build a backend and store holding these accounts.
    pub fn install(&self) -> anyhow::Result<(Arc<InMemoryIdentityBackend>, Arc<InMemoryProfileStore>)> {
        let backend = Arc::new(InMemoryIdentityBackend::new());
        let store = Arc::new(InMemoryProfileStore::new());
        let now = Utc::now();

        for account in &self.accounts {
            let email = Email::parse(&account.email)
                .with_context(|| format!("fixture account '{}'", account.email))?;
            let id = backend.register_account(&email, &account.password)?;

            let Some(fields) = &account.profile else {
                tracing::debug!(email = %email, "fixture account has no profile");
                continue;
            };
            let new = NewProfile {
                first_name: fields.first_name.clone(),
                last_name: fields.last_name.clone(),
                document_number: fields.document_number,
                email: account.email.clone(),
                role: fields.role,
                photo_url: fields.photo_url.clone(),
            };
            let profile = Profile::from_new(id, &new, now)
                .with_context(|| format!("fixture profile for '{}'", account.email))?;
            store.seed(&profile)?;
        }

        tracing::info!(accounts = self.accounts.len(), profiles = store.len(), "fixtures loaded");
        Ok((backend, store))
    }
}
