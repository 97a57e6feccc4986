//! Authentication gate and downstream authorization policy.
//!
//! The gate ([`authenticate`]) runs on every request. It either attaches an
//! [`AuthorizationContext`] to the request extensions or lets the request
//! through without one; it never rejects a request because a token failed
//! verification. Rejection is left to [`require_authenticated`] and
//! [`require_authority`], applied per route.
//!
//! The only gate failure that ends the request is an identity-store error,
//! which surfaces as a 500.

use crate::auth::{
    AuthorizationContext, KeySetCache, TokenClaims, TokenVerifier, VerificationError,
    BASE_AUTHORITY,
};
use crate::config::Config;
use crate::errors::ApiError;
use crate::models::RoleName;
use crate::observability::metrics;
use crate::services::IdentitySynchronizer;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use common::jwt::extract_kid;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

/// Why a request was left unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No `Authorization: Bearer` credentials.
    MissingCredentials,

    /// Wrong segment count, undecodable header, missing `kid` or oversized.
    MalformedToken,

    /// No key with the token's `kid` could be resolved.
    UnknownKey,

    /// Signature or claim validation failed.
    VerificationFailed(VerificationError),

    /// `iss` differs from the configured issuer.
    IssuerMismatch,
}

impl Rejection {
    /// Bounded label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::MissingCredentials => "missing_credentials",
            Rejection::MalformedToken => "malformed_token",
            Rejection::UnknownKey => "unknown_key",
            Rejection::VerificationFailed(_) => "verification_failed",
            Rejection::IssuerMismatch => "issuer_mismatch",
        }
    }
}

/// Request-level orchestrator of token verification and identity sync.
pub struct AuthenticationGate {
    key_cache: Arc<KeySetCache>,
    verifier: TokenVerifier,
    identity_sync: Arc<IdentitySynchronizer>,
    expected_issuer: String,
    bypass_prefixes: Vec<String>,
    role_hint_allowlist: BTreeSet<RoleName>,
}

impl AuthenticationGate {
    pub fn new(
        key_cache: Arc<KeySetCache>,
        identity_sync: Arc<IdentitySynchronizer>,
        config: &Config,
    ) -> Self {
        Self {
            key_cache,
            verifier: TokenVerifier::new(config.jwt_clock_skew),
            identity_sync,
            expected_issuer: config.jwt_issuer.clone(),
            bypass_prefixes: config.auth_bypass_prefixes.clone(),
            role_hint_allowlist: config.role_hint_allowlist.clone(),
        }
    }

    /// Whether `path` skips token processing entirely.
    ///
    /// A prefix matches the path itself and anything below it, on segment
    /// boundaries (`/health` matches `/health/live`, not `/healthz`).
    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass_prefixes.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            path.strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// Authenticate the credentials in `headers`.
    ///
    /// Returns `Ok(None)` for any verification failure.
    ///
    /// # Errors
    ///
    /// Identity-store failures during synchronization.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<AuthorizationContext>, ApiError> {
        let claims = match self.verify_request(headers).await {
            Ok(claims) => claims,
            Err(rejection) => {
                log_rejection(&rejection);
                metrics::record_auth_attempt(rejection.label());
                return Ok(None);
            }
        };

        let identity = self
            .identity_sync
            .sync(
                &claims.sub,
                claims.email.as_deref(),
                claims.first_name.as_deref(),
                claims.last_name.as_deref(),
            )
            .await
            .inspect_err(|_| metrics::record_auth_attempt("store_error"))?;

        let authorities = self.authorities_for(&claims);
        tracing::debug!(
            target: "nil.auth.gate",
            id = %identity.id,
            authorities = ?authorities,
            "Request authenticated"
        );
        metrics::record_auth_attempt("authenticated");

        Ok(Some(AuthorizationContext::new(
            claims.sub.clone(),
            authorities,
            claims,
        )))
    }

    async fn verify_request(&self, headers: &HeaderMap) -> Result<TokenClaims, Rejection> {
        let token = bearer_token(headers).ok_or(Rejection::MissingCredentials)?;

        let kid = extract_kid(token).map_err(|_| Rejection::MalformedToken)?;

        let key = self
            .key_cache
            .resolve(&kid)
            .await
            .ok_or(Rejection::UnknownKey)?;

        let claims = self
            .verifier
            .verify(token, &key)
            .map_err(Rejection::VerificationFailed)?;

        if !self.expected_issuer.is_empty() && claims.iss != self.expected_issuer {
            return Err(Rejection::IssuerMismatch);
        }

        Ok(claims)
    }

    /// `ROLE_USER` plus the role hint's authority when the hint names an
    /// allow-listed role.
    fn authorities_for(&self, claims: &TokenClaims) -> BTreeSet<String> {
        let mut authorities = BTreeSet::from([BASE_AUTHORITY.to_string()]);

        let Some(hint) = claims.role_hint() else {
            return authorities;
        };

        match hint.parse::<RoleName>() {
            Ok(role) if self.role_hint_allowlist.contains(&role) => {
                authorities.insert(role.authority());
            }
            Ok(role) => {
                tracing::warn!(target: "nil.auth.gate", role = %role, "Ignoring role hint outside the allow-list");
            }
            Err(_) => {
                tracing::warn!(target: "nil.auth.gate", "Ignoring unrecognized role hint");
            }
        }

        authorities
    }
}

/// The token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn log_rejection(rejection: &Rejection) {
    match rejection {
        Rejection::MissingCredentials => {
            tracing::trace!(target: "nil.auth.gate", "No bearer credentials");
        }
        Rejection::MalformedToken => {
            tracing::warn!(target: "nil.auth.gate", "Malformed bearer token");
        }
        Rejection::UnknownKey => {
            tracing::warn!(target: "nil.auth.gate", "No verification key for token kid");
        }
        Rejection::VerificationFailed(e) => {
            tracing::debug!(target: "nil.auth.gate", error = %e, "Token verification failed");
        }
        Rejection::IssuerMismatch => {
            tracing::warn!(target: "nil.auth.gate", "Token issuer does not match configured issuer");
        }
    }
}

/// Authentication gate middleware.
///
/// Attaches an [`AuthorizationContext`] when the request carries a valid
/// token and passes every other request through untouched.
#[instrument(skip_all, name = "nil.middleware.auth")]
pub async fn authenticate(
    State(gate): State<Arc<AuthenticationGate>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if gate.is_bypassed(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    if let Some(context) = gate.authenticate(req.headers()).await? {
        req.extensions_mut().insert(context);
    }

    Ok(next.run(req).await)
}

/// Rejects requests without an authorization context (401).
pub async fn require_authenticated(req: Request, next: Next) -> Result<Response, ApiError> {
    if req.authorization_context().is_none() {
        return Err(ApiError::Unauthorized(
            "Authentication required".to_string(),
        ));
    }
    Ok(next.run(req).await)
}

/// Rejects requests without a context (401) or without `authority` (403).
pub async fn require_authority(
    State(authority): State<&'static str>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match req.authorization_context() {
        None => Err(ApiError::Unauthorized(
            "Authentication required".to_string(),
        )),
        Some(context) if !context.has_authority(authority) => {
            tracing::debug!(target: "nil.auth.gate", required = %authority, "Missing required authority");
            Err(ApiError::Forbidden("Insufficient authority".to_string()))
        }
        Some(_) => Ok(next.run(req).await),
    }
}

/// Access to the authorization context attached by the gate.
pub trait AuthorizationContextExt {
    /// `None` if the gate did not authenticate this request.
    fn authorization_context(&self) -> Option<&AuthorizationContext>;
}

impl<B> AuthorizationContextExt for axum::http::Request<B> {
    fn authorization_context(&self) -> Option<&AuthorizationContext> {
        self.extensions().get::<AuthorizationContext>()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{KeyRecord, KeySetFetchError, KeySetSource};
    use crate::models::RoleName;
    use crate::repositories::unavailable::UnavailableIdentityStore;
    use crate::repositories::{IdentityStore, InMemoryIdentityStore};
    use async_trait::async_trait;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use nil_test_utils::crypto_fixtures::{PRIMARY_KEY, SECONDARY_KEY};
    use nil_test_utils::token_builders::TokenBuilder;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    const ISSUER: &str = "https://good.example";

    struct FixtureKeySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeySetSource for FixtureKeySource {
        async fn fetch(&self) -> Result<Vec<KeyRecord>, KeySetFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![KeyRecord::new(
                PRIMARY_KEY.kid,
                PRIMARY_KEY.modulus,
                PRIMARY_KEY.exponent,
            )])
        }
    }

    struct Harness {
        gate: Arc<AuthenticationGate>,
        store: Arc<InMemoryIdentityStore>,
        source: Arc<FixtureKeySource>,
    }

    fn harness_with(vars: &[(&str, &str)], store: InMemoryIdentityStore) -> Harness {
        let store = Arc::new(store);
        harness_over(vars, Arc::clone(&store), store)
    }

    /// Harness whose identity synchronization always fails.
    fn unavailable_harness() -> Harness {
        harness_over(
            &[],
            Arc::new(InMemoryIdentityStore::new()),
            Arc::new(UnavailableIdentityStore),
        )
    }

    fn harness_over(
        vars: &[(&str, &str)],
        store: Arc<InMemoryIdentityStore>,
        sync_store: Arc<dyn IdentityStore>,
    ) -> Harness {
        let mut env: HashMap<String, String> = HashMap::from([(
            "JWT_ISSUER".to_string(),
            ISSUER.to_string(),
        )]);
        for (k, v) in vars {
            env.insert((*k).to_string(), (*v).to_string());
        }
        let config = Config::from_vars(&env).unwrap();

        let source = Arc::new(FixtureKeySource {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(KeySetCache::new(source.clone(), Duration::from_secs(3600)));
        let sync = Arc::new(IdentitySynchronizer::new(sync_store));

        Harness {
            gate: Arc::new(AuthenticationGate::new(cache, sync, &config)),
            store,
            source,
        }
    }

    fn harness() -> Harness {
        harness_with(&[], InMemoryIdentityStore::new())
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    fn valid_token(sub: &str) -> String {
        TokenBuilder::new(sub).issuer(ISSUER).sign(&PRIMARY_KEY)
    }

    // -------------------------------------------------------------------------
    // Bypass and header parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_bypass_prefixes_match_on_segment_boundaries() {
        let h = harness();

        assert!(h.gate.is_bypassed("/api/v1/health"));
        assert!(h.gate.is_bypassed("/actuator/health"));
        assert!(h.gate.is_bypassed("/swagger-ui/index.html"));
        assert!(h.gate.is_bypassed("/metrics"));
        assert!(!h.gate.is_bypassed("/healthz"));
        assert!(!h.gate.is_bypassed("/api/v1/users/me"));
        assert!(!h.gate.is_bypassed("/api/v1/admin/users/x/roles"));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&bearer("abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(bearer_token(&basic), None);

        let mut empty = HeaderMap::new();
        empty.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&empty), None);

        let mut binary = HeaderMap::new();
        binary.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap(),
        );
        assert_eq!(bearer_token(&binary), None);
    }

    // -------------------------------------------------------------------------
    // Gate outcomes
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_valid_token_creates_identity_and_context() {
        let h = harness();

        let context = h
            .gate
            .authenticate(&bearer(&valid_token("user_abc123")))
            .await
            .unwrap()
            .expect("context should be attached");

        assert_eq!(context.identity_id(), "user_abc123");
        assert_eq!(
            context.authorities(),
            &BTreeSet::from([BASE_AUTHORITY.to_string()])
        );

        let identity = h
            .store
            .find_by_identity_id("user_abc123")
            .await
            .unwrap()
            .expect("identity should be stored");
        assert_eq!(identity.roles, BTreeSet::from([RoleName::Athlete]));
    }

    #[tokio::test]
    async fn test_missing_credentials_pass_through() {
        let h = harness();
        assert!(h.gate.authenticate(&HeaderMap::new()).await.unwrap().is_none());
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_tokens_pass_through_without_fetch() {
        let h = harness();

        for token in ["abc", "a.b", "a.b.c.d", "!!!.payload.signature", "e30.e30.sig"] {
            assert!(
                h.gate.authenticate(&bearer(token)).await.unwrap().is_none(),
                "token {token:?}"
            );
        }
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_kid_passes_through() {
        let h = harness();
        let token = TokenBuilder::new("user_abc123")
            .issuer(ISSUER)
            .kid("ins_unknown")
            .sign(&PRIMARY_KEY);

        assert!(h.gate.authenticate(&bearer(&token)).await.unwrap().is_none());
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_wrong_key_passes_through() {
        let h = harness();
        // Signed with the secondary key but claiming the primary kid
        let token = TokenBuilder::new("user_abc123")
            .issuer(ISSUER)
            .kid(PRIMARY_KEY.kid)
            .sign(&SECONDARY_KEY);

        assert!(h.gate.authenticate(&bearer(&token)).await.unwrap().is_none());
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_issuer_mismatch_passes_through() {
        let h = harness_with(
            &[("JWT_ISSUER", "https://good.example")],
            InMemoryIdentityStore::new(),
        );
        let token = TokenBuilder::new("user_abc123")
            .issuer("https://evil.example")
            .sign(&PRIMARY_KEY);

        assert!(h.gate.authenticate(&bearer(&token)).await.unwrap().is_none());
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_issuer_disables_check() {
        let h = harness_with(&[("JWT_ISSUER", "")], InMemoryIdentityStore::new());
        let token = TokenBuilder::new("user_abc123")
            .issuer("https://anything.example")
            .sign(&PRIMARY_KEY);

        assert!(h.gate.authenticate(&bearer(&token)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_role_hint_grants_authority() {
        let h = harness();
        let token = TokenBuilder::new("user_brand")
            .issuer(ISSUER)
            .role_hint("brand")
            .sign(&PRIMARY_KEY);

        let context = h.gate.authenticate(&bearer(&token)).await.unwrap().unwrap();
        assert!(context.has_authority("ROLE_USER"));
        assert!(context.has_authority("ROLE_BRAND"));
    }

    #[tokio::test]
    async fn test_role_hint_outside_allowlist_is_dropped() {
        let h = harness_with(
            &[("ROLE_HINT_ALLOWLIST", "ATHLETE,BRAND")],
            InMemoryIdentityStore::new(),
        );
        let token = TokenBuilder::new("user_sneaky")
            .issuer(ISSUER)
            .role_hint("admin")
            .sign(&PRIMARY_KEY);

        let context = h.gate.authenticate(&bearer(&token)).await.unwrap().unwrap();
        assert!(!context.has_authority("ROLE_ADMIN"));
        assert_eq!(context.authorities().len(), 1);
    }

    #[tokio::test]
    async fn test_unrecognized_role_hint_is_dropped() {
        let h = harness();
        let token = TokenBuilder::new("user_coach")
            .issuer(ISSUER)
            .role_hint("coach")
            .sign(&PRIMARY_KEY);

        let context = h.gate.authenticate(&bearer(&token)).await.unwrap().unwrap();
        assert_eq!(
            context.authorities(),
            &BTreeSet::from([BASE_AUTHORITY.to_string()])
        );
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let h = unavailable_harness();

        let result = h.gate.authenticate(&bearer(&valid_token("user_abc123"))).await;
        assert!(matches!(result, Err(ApiError::Database(_))));
    }

    // -------------------------------------------------------------------------
    // Middleware composition
    // -------------------------------------------------------------------------

    async fn whoami(req: Request) -> String {
        req.authorization_context()
            .map(|ctx| ctx.identity_id().to_string())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn app(gate: Arc<AuthenticationGate>) -> Router {
        Router::new()
            .route("/api/v1/health", get(whoami))
            .route("/open", get(whoami))
            .route(
                "/private",
                get(whoami).route_layer(middleware::from_fn(require_authenticated)),
            )
            .route(
                "/admin",
                get(whoami).route_layer(middleware::from_fn_with_state(
                    "ROLE_ADMIN",
                    require_authority,
                )),
            )
            .layer(middleware::from_fn_with_state(gate, authenticate))
    }

    async fn call(router: Router, uri: &str, token: Option<&str>) -> (StatusCode, String) {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = router
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_gate_attaches_context_for_handlers() {
        let h = harness();
        let token = valid_token("user_abc123");

        assert_eq!(
            call(app(h.gate.clone()), "/open", Some(&token)).await,
            (StatusCode::OK, "user_abc123".to_string())
        );
        assert_eq!(
            call(app(h.gate), "/open", Some("garbage")).await,
            (StatusCode::OK, "anonymous".to_string())
        );
    }

    #[tokio::test]
    async fn test_bypassed_path_skips_gate_entirely() {
        let h = unavailable_harness();

        let (status, body) = call(
            app(h.gate),
            "/api/v1/health",
            Some(&valid_token("user_abc123")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_require_authenticated() {
        let h = harness();

        assert_eq!(
            call(app(h.gate.clone()), "/private", None).await.0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            call(app(h.gate), "/private", Some(&valid_token("user_abc123")))
                .await
                .0,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_require_authority() {
        let h = harness();
        let admin = TokenBuilder::new("user_admin")
            .issuer(ISSUER)
            .role_hint("ADMIN")
            .sign(&PRIMARY_KEY);

        assert_eq!(
            call(app(h.gate.clone()), "/admin", None).await.0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            call(app(h.gate.clone()), "/admin", Some(&valid_token("user_abc123")))
                .await
                .0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            call(app(h.gate), "/admin", Some(&admin)).await,
            (StatusCode::OK, "user_admin".to_string())
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_500() {
        let h = unavailable_harness();

        let (status, _) = call(app(h.gate), "/open", Some(&valid_token("user_abc123"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
