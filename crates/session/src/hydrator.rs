//! Profile lookup and creation against the record store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use venue_core::{Entity, IdentityId};

use crate::backend::ProfileStore;
use crate::config::SessionConfig;
use crate::error::{BackendError, HydrateError};
use crate::profile::{NewProfile, Profile};

/// Resolves an identity id into its [`Profile`].
#[derive(Clone)]
pub struct ProfileHydrator {
    store: Arc<dyn ProfileStore>,
    timeout: Duration,
}

impl std::fmt::Debug for ProfileHydrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileHydrator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ProfileHydrator {
    pub fn new(store: Arc<dyn ProfileStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            timeout: config.request_timeout,
        }
    }

    /// Single primary-key read. Exactly one row is expected.
    pub async fn hydrate(&self, id: &IdentityId) -> Result<Profile, HydrateError> {
        let mut rows = self.bounded("profile read", self.store.select_by_id(id)).await?;

        match rows.len() {
            0 => Err(HydrateError::NotFound(id.clone())),
            1 => {
                let profile = decode(rows.remove(0))?;
                if !profile.belongs_to(id) {
                    return Err(BackendError::rejected(format!(
                        "profile read for {id} returned the row of {}",
                        profile.id
                    ))
                    .into());
                }
                Ok(profile)
            }
            n => Err(BackendError::rejected(format!(
                "expected one profile row for {id}, found {n}"
            ))
            .into()),
        }
    }

    /// Insert the profile for a freshly created identity.
    ///
    /// Both timestamps are set to now. A row already keyed by `id` fails
    /// with `BackendError::Duplicate`.
    pub async fn create_profile(
        &self,
        id: &IdentityId,
        fields: &NewProfile,
    ) -> Result<Profile, HydrateError> {
        let profile = Profile::from_new(id.clone(), fields, Utc::now())?;
        let row = serde_json::to_value(&profile)
            .map_err(|e| BackendError::rejected(format!("profile encoding failed: {e}")))?;

        let stored = self.bounded("profile insert", self.store.insert(row)).await?;
        decode(stored)
    }

    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| BackendError::unavailable(format!("{what} timed out after {:?}", self.timeout)))?
    }
}

fn decode(row: serde_json::Value) -> Result<Profile, HydrateError> {
    serde_json::from_value(row)
        .map_err(|e| HydrateError::from(BackendError::rejected(format!("malformed profile row: {e}"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryProfileStore;
    use venue_auth::Role;

    fn fields() -> NewProfile {
        NewProfile {
            first_name: "Ana".into(),
            last_name: "Paz".into(),
            document_number: 30111222,
            email: "ana@venue.test".into(),
            role: Some(Role::Cook),
            photo_url: None,
        }
    }

    fn hydrator(store: &Arc<InMemoryProfileStore>) -> ProfileHydrator {
        ProfileHydrator::new(store.clone(), &SessionConfig::default())
    }

    #[tokio::test]
    async fn missing_row_is_not_found() {
        let store = Arc::new(InMemoryProfileStore::new());
        let id = IdentityId::parse("ghost").unwrap();
        let err = hydrator(&store).hydrate(&id).await.unwrap_err();
        assert_eq!(err, HydrateError::NotFound(id));
    }

    #[tokio::test]
    async fn created_profile_can_be_hydrated() {
        let store = Arc::new(InMemoryProfileStore::new());
        let h = hydrator(&store);
        let id = IdentityId::parse("id-1").unwrap();

        let created = h.create_profile(&id, &fields()).await.unwrap();
        assert_eq!(created.created_at, created.updated_at);
        assert_eq!(h.hydrate(&id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn second_insert_for_same_identity_is_duplicate() {
        let store = Arc::new(InMemoryProfileStore::new());
        let h = hydrator(&store);
        let id = IdentityId::parse("id-1").unwrap();

        h.create_profile(&id, &fields()).await.unwrap();
        let err = h.create_profile(&id, &fields()).await.unwrap_err();
        assert!(matches!(err, HydrateError::Backend(BackendError::Duplicate(_))));
    }

    #[tokio::test]
    async fn invalid_fields_never_reach_the_store() {
        let store = Arc::new(InMemoryProfileStore::new());
        let mut bad = fields();
        bad.document_number = -4;
        let id = IdentityId::parse("id-1").unwrap();

        let err = hydrator(&store).create_profile(&id, &bad).await.unwrap_err();
        assert!(matches!(err, HydrateError::InvalidProfile(_)));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn malformed_row_is_rejected() {
        let store = Arc::new(InMemoryProfileStore::new());
        store.insert_raw(serde_json::json!({ "id": "id-1", "first_name": "only" }));
        let id = IdentityId::parse("id-1").unwrap();

        let err = hydrator(&store).hydrate(&id).await.unwrap_err();
        assert!(matches!(err, HydrateError::Backend(BackendError::Rejected(_))));
    }

    #[tokio::test]
    async fn store_outage_is_unavailable() {
        let store = Arc::new(InMemoryProfileStore::new());
        store.set_unavailable(true);
        let id = IdentityId::parse("id-1").unwrap();

        let err = hydrator(&store).hydrate(&id).await.unwrap_err();
        assert!(matches!(err, HydrateError::Backend(BackendError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out() {
        let store = Arc::new(InMemoryProfileStore::new());
        store.pause_reads();
        let config = SessionConfig {
            request_timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let h = ProfileHydrator::new(store.clone(), &config);
        let id = IdentityId::parse("id-1").unwrap();

        let err = h.hydrate(&id).await.unwrap_err();
        assert!(matches!(err, HydrateError::Backend(BackendError::Unavailable(_))));
    }

    /// Answers every read with the same rows, whatever id was asked for.
    struct FixedRows(Vec<serde_json::Value>);

    #[async_trait::async_trait]
    impl ProfileStore for FixedRows {
        async fn select_by_id(&self, _id: &IdentityId) -> Result<Vec<serde_json::Value>, BackendError> {
            Ok(self.0.clone())
        }

        async fn insert(&self, row: serde_json::Value) -> Result<serde_json::Value, BackendError> {
            Ok(row)
        }
    }

    #[tokio::test]
    async fn row_of_another_identity_is_rejected() {
        let other = Profile::from_new(IdentityId::parse("id-2").unwrap(), &fields(), Utc::now()).unwrap();
        let store = Arc::new(FixedRows(vec![serde_json::to_value(&other).unwrap()]));
        let h = ProfileHydrator::new(store, &SessionConfig::default());

        let err = h.hydrate(&IdentityId::parse("id-1").unwrap()).await.unwrap_err();
        assert!(matches!(err, HydrateError::Backend(BackendError::Rejected(_))));
    }
}
