//! Request-scoped authorization context produced by the authentication gate.

use crate::auth::claims::TokenClaims;
use std::collections::BTreeSet;
use std::fmt;

/// Authority granted to every authenticated request.
pub const BASE_AUTHORITY: &str = "ROLE_USER";

/// Identity and authorities attached to an authenticated request.
///
/// Lives in the request extensions and is dropped with the request.
#[derive(Clone)]
pub struct AuthorizationContext {
    identity_id: String,
    authorities: BTreeSet<String>,
    claims: TokenClaims,
}

impl AuthorizationContext {
    pub fn new(identity_id: String, authorities: BTreeSet<String>, claims: TokenClaims) -> Self {
        Self {
            identity_id,
            authorities,
            claims,
        }
    }

    /// External identity id (the token's `sub`).
    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    pub fn authorities(&self) -> &BTreeSet<String> {
        &self.authorities
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }
}

impl fmt::Debug for AuthorizationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationContext")
            .field("identity_id", &"[REDACTED]")
            .field("authorities", &self.authorities)
            .field("claims", &self.claims)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn context(authorities: &[&str]) -> AuthorizationContext {
        let claims: TokenClaims =
            serde_json::from_value(serde_json::json!({"sub": "user_abc123", "exp": 1_900_000_000}))
                .unwrap();
        AuthorizationContext::new(
            "user_abc123".to_string(),
            authorities.iter().map(|a| (*a).to_string()).collect(),
            claims,
        )
    }

    #[test]
    fn test_has_authority() {
        let ctx = context(&[BASE_AUTHORITY, "ROLE_BRAND"]);

        assert!(ctx.has_authority("ROLE_USER"));
        assert!(ctx.has_authority("ROLE_BRAND"));
        assert!(!ctx.has_authority("ROLE_ADMIN"));
        assert_eq!(ctx.identity_id(), "user_abc123");
    }

    #[test]
    fn test_debug_redacts_identity() {
        let debug = format!("{:?}", context(&[BASE_AUTHORITY]));
        assert!(!debug.contains("user_abc123"));
        assert!(debug.contains("ROLE_USER"));
    }
}
