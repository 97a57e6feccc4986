//! Builder for test bearer tokens
//!
//! Produces signed compact tokens shaped like the identity provider's:
//!
//! ```rust,ignore
//! let token = TokenBuilder::new("user_abc123")
//!     .issuer("https://clerk.example.dev")
//!     .email("athlete@example.edu")
//!     .role_hint("BRAND")
//!     .sign(&PRIMARY_KEY);
//! ```

use crate::crypto_fixtures::{TestSigningKey, PRIMARY_KEY};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for test tokens.
///
/// Defaults: `iat` now, `exp` one hour from now, RS256, `kid` taken from
/// the signing key.
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    claims: Map<String, Value>,
    algorithm: Algorithm,
    kid: Option<String>,
}

impl TokenBuilder {
    pub fn new(sub: &str) -> Self {
        let now = Utc::now().timestamp();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(sub));
        claims.insert("iat".to_string(), json!(now));
        claims.insert("exp".to_string(), json!(now + 3600));
        Self {
            claims,
            algorithm: Algorithm::RS256,
            kid: None,
        }
    }

    /// Set an arbitrary claim.
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    pub fn issuer(self, issuer: &str) -> Self {
        self.claim("iss", json!(issuer))
    }

    pub fn email(self, email: &str) -> Self {
        self.claim("email", json!(email))
    }

    pub fn first_name(self, first_name: &str) -> Self {
        self.claim("first_name", json!(first_name))
    }

    pub fn last_name(self, last_name: &str) -> Self {
        self.claim("last_name", json!(last_name))
    }

    /// Set `public_metadata.role`.
    pub fn role_hint(self, role: &str) -> Self {
        self.claim("public_metadata", json!({ "role": role }))
    }

    pub fn issued_at(self, timestamp: i64) -> Self {
        self.claim("iat", json!(timestamp))
    }

    pub fn expires_at(self, timestamp: i64) -> Self {
        self.claim("exp", json!(timestamp))
    }

    pub fn not_before(self, timestamp: i64) -> Self {
        self.claim("nbf", json!(timestamp))
    }

    /// Drop a claim, including the defaults.
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Override the header `kid`.
    pub fn kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Set the signing algorithm (RSA family).
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// The payload as JSON.
    pub fn claims(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign with `key`.
    ///
    /// # Panics
    ///
    /// If encoding fails.
    pub fn sign(&self, key: &TestSigningKey) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone().unwrap_or_else(|| key.kid.to_string()));
        encode(&header, &self.claims(), &key.encoding_key()).expect("test token encodes")
    }

    /// Sign with HMAC-SHA256 using `secret`.
    ///
    /// # Panics
    ///
    /// If encoding fails.
    pub fn sign_hs256(&self, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.header_kid());
        encode(&header, &self.claims(), &EncodingKey::from_secret(secret))
            .expect("test token encodes")
    }

    /// An `alg: none` token with an empty signature segment.
    pub fn unsigned(&self) -> String {
        let header = json!({ "alg": "none", "typ": "JWT", "kid": self.header_kid() });
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(self.claims().to_string())
        )
    }

    fn header_kid(&self) -> String {
        self.kid
            .clone()
            .unwrap_or_else(|| PRIMARY_KEY.kid.to_string())
    }
}

/// Seconds since the Unix epoch.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::decode_header;

    #[test]
    fn test_builder_defaults() {
        let claims = TokenBuilder::new("user_abc123").claims();

        assert_eq!(claims["sub"], "user_abc123");
        let iat = claims["iat"].as_i64().unwrap();
        assert_eq!(claims["exp"].as_i64().unwrap(), iat + 3600);
        assert!(claims.get("iss").is_none());
    }

    #[test]
    fn test_sign_uses_key_kid() {
        let token = TokenBuilder::new("user_abc123").sign(&PRIMARY_KEY);
        let header = decode_header(&token).unwrap();

        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(PRIMARY_KEY.kid));
    }

    #[test]
    fn test_kid_override() {
        let token = TokenBuilder::new("user_abc123")
            .kid("ins_other")
            .algorithm(Algorithm::RS512)
            .sign(&PRIMARY_KEY);
        let header = decode_header(&token).unwrap();

        assert_eq!(header.alg, Algorithm::RS512);
        assert_eq!(header.kid.as_deref(), Some("ins_other"));
    }

    #[test]
    fn test_role_hint_and_without_claim() {
        let claims = TokenBuilder::new("user_abc123")
            .role_hint("BRAND")
            .without_claim("iat")
            .claims();

        assert_eq!(claims["public_metadata"]["role"], "BRAND");
        assert!(claims.get("iat").is_none());
    }

    #[test]
    fn test_unsigned_has_empty_signature() {
        let token = TokenBuilder::new("user_abc123").unsigned();
        assert!(token.ends_with('.'));
        assert_eq!(token.split('.').count(), 3);
    }
}
