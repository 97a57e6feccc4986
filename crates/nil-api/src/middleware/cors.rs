//! Cross-origin policy for the browser frontend.
//!
//! Credentialed requests are allowed from the configured origins only.
//! Preflights are answered here and never reach the authentication gate.

use axum::http::{HeaderValue, Method};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
];

/// Build the CORS layer for `allowed_origins`.
///
/// Request headers are mirrored back, which is the credential-compatible
/// form of allowing any header.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let patterns: Arc<[String]> = allowed_origins.into();
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _request| {
        origin
            .to_str()
            .is_ok_and(|origin| origin_allowed(&patterns, origin))
    });

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Whether `origin` matches one of `patterns`.
///
/// `https://*.example.com` matches `https://app.example.com` and deeper
/// subdomains, not `https://example.com`.
pub fn origin_allowed(patterns: &[String], origin: &str) -> bool {
    patterns.iter().any(|pattern| match pattern.split_once("*.") {
        None => pattern == origin,
        Some((scheme, domain)) => origin
            .strip_prefix(scheme)
            .and_then(|host| host.strip_suffix(domain))
            .and_then(|subdomain| subdomain.strip_suffix('.'))
            .is_some_and(|subdomain| {
                !subdomain.is_empty()
                    && subdomain
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            }),
    })
}
