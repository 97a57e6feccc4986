//! Administrative identity endpoints.

use crate::errors::ApiError;
use crate::models::{AssignRoleRequest, IdentityResponse, RoleName};
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for `POST /api/v1/admin/users/:identity_id/roles`.
///
/// Adds the requested role to an existing identity. Adding a role the
/// identity already holds is a no-op.
///
/// # Errors
///
/// - 400 if `role` is not a recognized role name
/// - 404 if the identity does not exist
#[instrument(skip_all, name = "nil.admin.assign_role")]
pub async fn assign_role(
    State(state): State<Arc<AppState>>,
    Path(identity_id): Path<String>,
    Json(request): Json<AssignRoleRequest>,
) -> Result<Json<IdentityResponse>, ApiError> {
    let role = request
        .role
        .parse::<RoleName>()
        .map_err(|e| ApiError::BadRequest(format!("Unknown role: {}", e.0)))?;

    let identity = state.identity_sync.assign_role(&identity_id, role).await?;

    Ok(Json(identity.into()))
}
