//! In-memory identity store.
//!
//! Used by the binary when no database is configured and by tests. Every
//! mutation is a read-modify-write under one write lock.

use crate::errors::ApiError;
use crate::models::{IdentityStatus, LocalIdentity, ProfileUpdate, RoleName};
use crate::repositories::users::{IdentityStore, UpsertOutcome};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryIdentityStore {
    identities: RwLock<HashMap<String, LocalIdentity>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.identities.read().await.is_empty()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_identity_id(
        &self,
        identity_id: &str,
    ) -> Result<Option<LocalIdentity>, ApiError> {
        Ok(self.identities.read().await.get(identity_id).cloned())
    }

    async fn upsert_profile(
        &self,
        identity_id: &str,
        profile: &ProfileUpdate,
        default_role: RoleName,
    ) -> Result<UpsertOutcome, ApiError> {
        let mut identities = self.identities.write().await;
        let now = Utc::now();

        if let Some(existing) = identities.get_mut(identity_id) {
            if let Some(email) = &profile.email {
                existing.email = Some(email.clone());
            }
            if let Some(first_name) = &profile.first_name {
                existing.first_name = Some(first_name.clone());
            }
            if let Some(last_name) = &profile.last_name {
                existing.last_name = Some(last_name.clone());
            }
            existing.updated_at = now;
            return Ok(UpsertOutcome::Updated(existing.clone()));
        }

        let identity = LocalIdentity {
            id: Uuid::new_v4(),
            identity_id: identity_id.to_string(),
            email: profile.email.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            roles: BTreeSet::from([default_role]),
            status: IdentityStatus::Active,
            created_at: now,
            updated_at: now,
        };
        identities.insert(identity_id.to_string(), identity.clone());

        Ok(UpsertOutcome::Created(identity))
    }

    async fn add_role(
        &self,
        identity_id: &str,
        role: RoleName,
    ) -> Result<Option<LocalIdentity>, ApiError> {
        let mut identities = self.identities.write().await;

        Ok(identities.get_mut(identity_id).map(|identity| {
            if identity.roles.insert(role) {
                identity.updated_at = Utc::now();
            }
            identity.clone()
        }))
    }
}
