//! Identity store doubles
//!
//! Stores that stand in for a broken database in integration tests.

use async_trait::async_trait;
use nil_api::errors::ApiError;
use nil_api::models::{LocalIdentity, ProfileUpdate, RoleName};
use nil_api::repositories::{IdentityStore, UpsertOutcome};

/// Fails every operation with `ApiError::Database`, like a store whose
/// connection pool is exhausted.
pub struct UnavailableIdentityStore;

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
