//! HTTP routes for the NIL API.

use crate::auth::{HttpKeySetFetcher, KeySetCache, KeySetSource};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{
    authenticate, cors_layer, http_metrics_middleware, require_authenticated, require_authority,
    AuthenticationGate,
};
use crate::repositories::IdentityStore;
use crate::services::IdentitySynchronizer;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Authority required by the administrative routes.
pub const ADMIN_AUTHORITY: &str = "ROLE_ADMIN";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Database pool, `None` when running on the in-memory store.
    pub pool: Option<PgPool>,

    /// Local identity synchronization.
    pub identity_sync: Arc<IdentitySynchronizer>,

    /// Authentication gate run on every request.
    pub gate: Arc<AuthenticationGate>,
}

impl AppState {
    /// Build state that fetches signing keys from `config.jwks_url`.
    pub fn new(config: Config, pool: Option<PgPool>, store: Arc<dyn IdentityStore>) -> Self {
        let source = Arc::new(HttpKeySetFetcher::with_timeout(
            config.jwks_url.clone(),
            config.jwks_fetch_timeout,
        ));
        Self::with_key_source(config, pool, store, source)
    }

    /// Build state around an arbitrary key-set source.
    pub fn with_key_source(
        config: Config,
        pool: Option<PgPool>,
        store: Arc<dyn IdentityStore>,
        source: Arc<dyn KeySetSource>,
    ) -> Self {
        let key_cache = Arc::new(KeySetCache::new(source, config.jwks_cache_ttl));
        let identity_sync = Arc::new(IdentitySynchronizer::new(store));
        let gate = Arc::new(AuthenticationGate::new(
            key_cache,
            Arc::clone(&identity_sync),
            &config,
        ));

        Self {
            config,
            pool,
            identity_sync,
            gate,
        }
    }
}

/// Build the application routes.
///
/// Public routes:
/// - `GET /api/v1/health`
/// - `GET /metrics`
///
/// Authenticated routes:
/// - `GET /api/v1/users/me`
///
/// `ROLE_ADMIN` routes:
/// - `POST /api/v1/admin/users/:identity_id/roles`
///
/// The authentication gate runs for every request. It only attaches a
/// context; per-route layers decide whether a missing context is a 401.
/// CORS sits outside the gate so preflights are answered without a token.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let user_routes = Router::new()
        .route("/api/v1/users/me", get(handlers::get_me))
        .route_layer(middleware::from_fn(require_authenticated))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(
            "/api/v1/admin/users/:identity_id/roles",
            post(handlers::assign_role),
        )
        .route_layer(middleware::from_fn_with_state(
            ADMIN_AUTHORITY,
            require_authority,
        ))
        .with_state(state.clone());

    // Layer order (outermost first): metrics, timeout, trace, cors, auth gate
    public_routes
        .merge(metrics_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.gate),
            authenticate,
        ))
        .layer(cors_layer(&state.config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
