//! Identity store whose every operation fails.

use crate::errors::ApiError;
use crate::models::{LocalIdentity, ProfileUpdate, RoleName};
use crate::repositories::users::{IdentityStore, UpsertOutcome};
use async_trait::async_trait;

pub(crate) struct UnavailableIdentityStore;

fn unavailable() -> ApiError {
    ApiError::Database("identity store unavailable".to_string())
}

#[async_trait]
impl IdentityStore for UnavailableIdentityStore {
    async fn find_by_identity_id(
        &self,
        _identity_id: &str,
    ) -> Result<Option<LocalIdentity>, ApiError> {
        Err(unavailable())
    }

    async fn upsert_profile(
        &self,
        _identity_id: &str,
        _profile: &ProfileUpdate,
        _default_role: RoleName,
    ) -> Result<UpsertOutcome, ApiError> {
        Err(unavailable())
    }

    async fn add_role(
        &self,
        _identity_id: &str,
        _role: RoleName,
    ) -> Result<Option<LocalIdentity>, ApiError> {
        Err(unavailable())
    }
}
