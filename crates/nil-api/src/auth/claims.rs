//! Claims carried by identity-provider session tokens.
//!
//! `sub` and `email` are redacted in Debug output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Claims of a verified session token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// External identity id - redacted in Debug output.
    pub sub: String,

    /// Issuer. Compared against the configured issuer by the gate.
    #[serde(default)]
    pub iss: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Provider-managed metadata; only `role` is read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_metadata: Option<serde_json::Value>,
}

impl TokenClaims {
    /// The role hint in `public_metadata.role`, when it is a non-blank string.
    ///
    /// Any other shape (missing, number, object) yields `None`.
    pub fn role_hint(&self) -> Option<&str> {
        self.public_metadata
            .as_ref()?
            .get("role")?
            .as_str()
            .map(str::trim)
            .filter(|role| !role.is_empty())
    }
}

impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClaims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("role_hint", &self.role_hint())
            .finish()
    }
}
