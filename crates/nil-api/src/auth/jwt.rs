//! Token verification against a resolved RSA key.
//!
//! # Security
//!
//! - Only RS256, RS384 and RS512 are accepted; the declared algorithm is
//!   checked before any signature work, so `none` and HMAC tokens never
//!   reach the verifier
//! - `exp` is required; `exp`/`nbf` get the configured clock-skew leeway
//! - `iat`, when present, may not be further in the future than the skew
//! - The issuer is not checked here

use crate::auth::claims::TokenClaims;
use crate::auth::keys::RsaPublicKey;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use common::jwt::{split_segments, validate_iat, DEFAULT_CLOCK_SKEW};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::time::Duration;
use thiserror::Error;

/// Signature algorithms accepted from the identity provider.
pub const ACCEPTED_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Token is malformed")]
    Malformed,

    #[error("Token algorithm is not accepted: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is not yet valid")]
    NotYetValid,

    #[error("Token iat is too far in the future")]
    IssuedInFuture,

    #[error("Token claims are invalid")]
    InvalidClaims,
}

/// Verifies token signatures and time-based claims.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    clock_skew: Duration,
}

impl Default for TokenVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_SKEW)
    }
}

impl TokenVerifier {
    pub fn new(clock_skew: Duration) -> Self {
        Self { clock_skew }
    }

    /// Verify `token` with `key` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns a `VerificationError` for any structural, cryptographic or
    /// temporal failure; never partial claims.
    pub fn verify(
        &self,
        token: &str,
        key: &RsaPublicKey,
    ) -> Result<TokenClaims, VerificationError> {
        let algorithm = declared_algorithm(token)?;

        let mut validation = Validation::new(algorithm);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data = decode::<TokenClaims>(token, key.decoding_key(), &validation).map_err(|e| {
            tracing::debug!(target: "nil.auth.jwt", error = %e, "Token verification failed");
            map_decode_error(e.kind())
        })?;
        let claims = token_data.claims;

        if claims.sub.trim().is_empty() {
            tracing::debug!(target: "nil.auth.jwt", "Token rejected: empty sub");
            return Err(VerificationError::InvalidClaims);
        }

        if let Some(iat) = claims.iat {
            validate_iat(iat, self.clock_skew).map_err(|_| VerificationError::IssuedInFuture)?;
        }

        tracing::debug!(target: "nil.auth.jwt", "Token verified");
        Ok(claims)
    }
}

/// Read `alg` from the JOSE header and require an accepted RSA algorithm.
fn declared_algorithm(token: &str) -> Result<Algorithm, VerificationError> {
    let segments = split_segments(token).map_err(|_| VerificationError::Malformed)?;

    let header_bytes = URL_SAFE_NO_PAD
        .decode(segments.header)
        .map_err(|_| VerificationError::Malformed)?;
    let header: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| VerificationError::Malformed)?;

    let alg = header
        .get("alg")
        .and_then(serde_json::Value::as_str)
        .ok_or(VerificationError::Malformed)?;

    match alg {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        other => {
            tracing::warn!(target: "nil.auth.jwt", alg = %other, "Token rejected: algorithm not accepted");
            Err(VerificationError::UnsupportedAlgorithm(other.to_string()))
        }
    }
}

fn map_decode_error(kind: &ErrorKind) -> VerificationError {
    match kind {
        ErrorKind::ExpiredSignature => VerificationError::Expired,
        ErrorKind::ImmatureSignature => VerificationError::NotYetValid,
        ErrorKind::InvalidAlgorithm => {
            VerificationError::UnsupportedAlgorithm("mismatched key family".to_string())
        }
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
            VerificationError::Malformed
        }
        ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => VerificationError::InvalidClaims,
        _ => VerificationError::InvalidSignature,
    }
}
