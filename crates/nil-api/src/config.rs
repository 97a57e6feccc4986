//! NIL API configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! redacted in Debug output.

use crate::models::RoleName;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default freshness window of the cached key set (1 hour).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 3600;

/// Upper bound on the key-set freshness window (1 day).
pub const MAX_JWKS_CACHE_TTL_SECONDS: u64 = 86_400;

/// Default timeout for a single key-set fetch.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 5;

/// Upper bound on the key-set fetch timeout.
pub const MAX_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Path prefixes that skip token processing entirely.
pub const DEFAULT_AUTH_BYPASS_PREFIXES: &[&str] = &[
    "/api/v1/health",
    "/health",
    "/actuator",
    "/swagger-ui",
    "/api-docs",
    "/h2-console",
    "/metrics",
];

/// Browser origins allowed to call the API with credentials.
///
/// `https://*.domain` entries match any subdomain of `domain`.
pub const DEFAULT_CORS_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:3000",
    "https://safosportsgroup.com",
    "https://*.safosportsgroup.com",
];

/// NIL API configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// PostgreSQL connection URL. `None` selects the in-memory identity store.
    pub database_url: Option<String>,

    /// Identity provider key-set endpoint. Empty means no keys can be resolved.
    pub jwks_url: String,

    /// Expected `iss` claim. Empty disables the issuer check.
    pub jwt_issuer: String,

    /// Freshness window of the cached key set.
    pub jwks_cache_ttl: Duration,

    /// Timeout applied to each key-set fetch.
    pub jwks_fetch_timeout: Duration,

    /// Leeway for `exp`/`nbf` and the future bound for `iat`.
    pub jwt_clock_skew: Duration,

    /// Request path prefixes the authentication gate ignores.
    pub auth_bypass_prefixes: Vec<String>,

    /// Roles a token's `public_metadata.role` hint may grant.
    pub role_hint_allowlist: BTreeSet<RoleName>,

    /// Origins answered with CORS headers. Empty disables cross-origin access.
    pub cors_allowed_origins: Vec<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("jwks_url", &self.jwks_url)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("jwks_fetch_timeout", &self.jwks_fetch_timeout)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("auth_bypass_prefixes", &self.auth_bypass_prefixes)
            .field("role_hint_allowlist", &self.role_hint_allowlist)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWKS cache TTL configuration: {0}")]
    InvalidJwksCacheTtl(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidJwksFetchTimeout(String),

    #[error("Invalid role hint allow-list: {0}")]
    InvalidRoleHintAllowlist(String),

    #[error("Invalid CORS origin: {0}")]
    InvalidCorsOrigin(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let database_url = vars
            .get("DATABASE_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let jwks_url = vars
            .get("JWKS_URL")
            .map(|url| url.trim().to_string())
            .unwrap_or_default();

        let jwt_issuer = vars
            .get("JWT_ISSUER")
            .map(|iss| iss.trim().to_string())
            .unwrap_or_default();

        let jwks_cache_ttl = parse_bounded_seconds(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
            MAX_JWKS_CACHE_TTL_SECONDS,
            ConfigError::InvalidJwksCacheTtl,
        )?;

        let jwks_fetch_timeout = parse_bounded_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
            MAX_JWKS_FETCH_TIMEOUT_SECONDS,
            ConfigError::InvalidJwksFetchTimeout,
        )?;

        let jwt_clock_skew = parse_bounded_seconds(
            vars,
            "JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_CLOCK_SKEW.as_secs(),
            MAX_CLOCK_SKEW.as_secs(),
            ConfigError::InvalidJwtClockSkew,
        )?;

        let auth_bypass_prefixes = match vars.get("AUTH_BYPASS_PREFIXES") {
            Some(value) => split_list(value).map(str::to_string).collect(),
            None => DEFAULT_AUTH_BYPASS_PREFIXES
                .iter()
                .map(|prefix| (*prefix).to_string())
                .collect(),
        };

        let role_hint_allowlist = match vars.get("ROLE_HINT_ALLOWLIST") {
            Some(value) => split_list(value)
                .map(|name| {
                    name.parse::<RoleName>().map_err(|e| {
                        ConfigError::InvalidRoleHintAllowlist(format!(
                            "ROLE_HINT_ALLOWLIST contains an unknown role: {e}"
                        ))
                    })
                })
                .collect::<Result<BTreeSet<_>, _>>()?,
            None => RoleName::ALL.into_iter().collect(),
        };

        let cors_allowed_origins: Vec<String> = match vars.get("CORS_ALLOWED_ORIGINS") {
            Some(value) => split_list(value).map(str::to_string).collect(),
            None => DEFAULT_CORS_ALLOWED_ORIGINS
                .iter()
                .map(|origin| (*origin).to_string())
                .collect(),
        };
        for origin in &cors_allowed_origins {
            validate_origin(origin)?;
        }

        Ok(Config {
            bind_address,
            database_url,
            jwks_url,
            jwt_issuer,
            jwks_cache_ttl,
            jwks_fetch_timeout,
            jwt_clock_skew,
            auth_bypass_prefixes,
            role_hint_allowlist,
            cors_allowed_origins,
        })
    }
}

/// Parse a positive number of seconds no greater than `max`.
fn parse_bounded_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    max: u64,
    error: fn(String) -> ConfigError,
) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(Duration::from_secs(default));
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        error(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(error(format!("{name} must be positive, got 0")));
    }

    if value > max {
        return Err(error(format!(
            "{name} must not exceed {max} seconds, got {value}"
        )));
    }

    Ok(Duration::from_secs(value))
}

/// An origin is `scheme://host[:port]` with no path, optionally with a
/// leading `*.` on the host.
fn validate_origin(origin: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidCorsOrigin(format!("'{origin}' {reason}"));

    let host = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .ok_or_else(|| invalid("must start with http:// or https://"))?;
    let host = host.strip_prefix("*.").unwrap_or(host);

    if host.is_empty() {
        return Err(invalid("has no host"));
    }
    if host.contains(['/', '*', '?', '#'])
        || !host.is_ascii()
        || host.contains(char::is_whitespace)
    {
        return Err(invalid("must be scheme://host[:port] without a path"));
    }
    Ok(())
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}
