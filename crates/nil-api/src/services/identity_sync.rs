//! Synchronization of verified identities into local storage.
//!
//! Every authenticated request upserts the caller's local identity: the
//! first sighting creates it with status `ACTIVE` and role `ATHLETE`, later
//! sightings refresh whichever profile fields the token carries.

use crate::errors::ApiError;
use crate::models::{LocalIdentity, ProfileUpdate, RoleName};
use crate::observability::metrics;
use crate::repositories::{IdentityStore, UpsertOutcome};
use std::sync::Arc;
use tracing::instrument;

/// Role given to identities on first sighting.
pub const DEFAULT_ROLE: RoleName = RoleName::Athlete;

pub struct IdentitySynchronizer {
    store: Arc<dyn IdentityStore>,
}

impl IdentitySynchronizer {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Create or update the local identity for a verified token subject.
    ///
    /// `None` profile fields leave the stored values unchanged.
    ///
    /// # Errors
    ///
    /// Propagates identity-store failures.
    #[instrument(skip_all, name = "nil.identity.sync")]
    pub async fn sync(
        &self,
        identity_id: &str,
        email: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<LocalIdentity, ApiError> {
        let profile = ProfileUpdate {
            email: email.map(str::to_string),
            first_name: first_name.map(str::to_string),
            last_name: last_name.map(str::to_string),
        };

        let outcome = self
            .store
            .upsert_profile(identity_id, &profile, DEFAULT_ROLE)
            .await
            .inspect_err(|e| {
                tracing::error!(target: "nil.identity.sync", error = %e, "Identity sync failed");
                metrics::record_identity_sync("sync", "error");
            })?;

        match outcome {
            UpsertOutcome::Created(identity) => {
                tracing::info!(
                    target: "nil.identity.sync",
                    id = %identity.id,
                    role = %DEFAULT_ROLE,
                    "Created local identity"
                );
                metrics::record_identity_sync("sync", "created");
                Ok(identity)
            }
            UpsertOutcome::Updated(identity) => {
                tracing::debug!(target: "nil.identity.sync", id = %identity.id, "Updated local identity");
                metrics::record_identity_sync("sync", "updated");
                Ok(identity)
            }
        }
    }

    /// Add `role` to an existing identity.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no identity has this id
    /// - Identity-store failures
    #[instrument(skip_all, name = "nil.identity.assign_role", fields(role = %role))]
    pub async fn assign_role(
        &self,
        identity_id: &str,
        role: RoleName,
    ) -> Result<LocalIdentity, ApiError> {
        let result = self.store.add_role(identity_id, role).await;

        match result {
            Ok(Some(identity)) => {
                tracing::info!(target: "nil.identity.sync", id = %identity.id, role = %role, "Assigned role");
                metrics::record_identity_sync("assign_role", "success");
                Ok(identity)
            }
            Ok(None) => {
                tracing::debug!(target: "nil.identity.sync", "Role assignment for unknown identity");
                metrics::record_identity_sync("assign_role", "not_found");
                Err(ApiError::NotFound("Identity not found".to_string()))
            }
            Err(e) => {
                tracing::error!(target: "nil.identity.sync", error = %e, "Role assignment failed");
                metrics::record_identity_sync("assign_role", "error");
                Err(e)
            }
        }
    }

    pub async fn find(&self, identity_id: &str) -> Result<Option<LocalIdentity>, ApiError> {
        self.store.find_by_identity_id(identity_id).await
    }
}
