//! Health check handler.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Health check handler for `GET /api/v1/health`.
///
/// Always answers 200 so that orchestrators can read the body:
///
/// ```json
/// { "status": "UP", "database": "healthy" }
/// ```
///
/// `database` is `not_configured` when the in-memory store is in use.
#[instrument(skip_all, name = "nil.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match &state.pool {
        Some(pool) => {
            if sqlx::query("SELECT 1").fetch_one(pool).await.is_ok() {
                "healthy"
            } else {
                "unhealthy"
            }
        }
        None => "not_configured",
    };

    let status = if database == "unhealthy" { "DOWN" } else { "UP" };

    Json(HealthResponse {
        status: status.to_string(),
        database: database.to_string(),
    })
}
