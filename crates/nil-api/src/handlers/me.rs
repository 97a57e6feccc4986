//! Current identity endpoint.

use crate::auth::AuthorizationContext;
use crate::errors::ApiError;
use crate::models::MeResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for `GET /api/v1/users/me`.
///
/// Returns the caller's identity id, granted authorities and synchronized
/// local identity. Requires an authorization context.
#[instrument(skip_all, name = "nil.users.me")]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthorizationContext>,
) -> Result<Json<MeResponse>, ApiError> {
    let identity = state
        .identity_sync
        .find(context.identity_id())
        .await?
        .ok_or_else(|| ApiError::NotFound("Identity not found".to_string()))?;

    Ok(Json(MeResponse {
        identity_id: context.identity_id().to_string(),
        authorities: context.authorities().iter().cloned().collect(),
        identity: identity.into(),
    }))
}
