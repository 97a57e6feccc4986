//! JWT primitives shared across NIL platform components.
//!
//! This module provides the pieces of token handling that do not depend on
//! a verification key:
//! - Size limits for DoS prevention
//! - Clock skew constants for time-based claim validation
//! - Compact-serialization segment splitting
//! - Key ID extraction from JWT headers
//! - `iat` validation logic
//! - Decoding of base64url-encoded unsigned integers (JWK `n` / `e`)
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing in this module verifies a signature; every value it extracts
//!   is untrusted until the token has been verified
//! - Generic error messages prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_kid, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! // Extract key ID for JWKS lookup (includes the size check)
//! let kid = extract_kid(token)?;
//!
//! // After signature verification, validate iat
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any base64 decoding or
/// cryptographic operations.
///
/// Identity-provider session tokens with profile claims and public metadata
/// are typically 700-1500 bytes; 8KB leaves generous headroom.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes per NIST SP 800-63B).
///
/// Applied as leeway to `exp`/`nbf` and as the future bound for `iat`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Configuration above this value is rejected.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Number of segments in a compact-serialized JWS (`header.payload.signature`).
pub const JWT_SEGMENT_COUNT: usize = 3;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT before verification.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (wrong segment count, bad base64, bad JSON).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

/// Segments of a compact-serialized token, borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSegments<'a> {
    /// Base64url-encoded JOSE header.
    pub header: &'a str,

    /// Base64url-encoded claims payload.
    pub payload: &'a str,

    /// Base64url-encoded signature.
    pub signature: &'a str,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a token into its three segments.
///
/// The size limit is enforced first so that oversized input never reaches
/// the splitter.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Token does not have exactly three segments
pub fn split_segments(token: &str) -> Result<TokenSegments<'_>, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let segments = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => TokenSegments {
            header,
            payload,
            signature,
        },
        _ => {
            tracing::debug!(
                target: "common.jwt",
                parts = token.split('.').count(),
                expected = JWT_SEGMENT_COUNT,
                "Token rejected: invalid JWT format"
            );
            return Err(JwtValidationError::MalformedToken);
        }
    };

    Ok(segments)
}

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// This is used to look up the correct verification key when the identity
/// provider publishes several keys (e.g., during key rotation).
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - This function does NOT validate the token signature
/// - The `kid` value should only be used for key lookup in a trusted JWKS
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds size limit
/// - `MalformedToken` - Wrong segment count, bad base64, or invalid JSON header
/// - `MissingKid` - Header has no `kid`, or `kid` is not a non-empty string
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    let segments = split_segments(token)?;

    let header_bytes = URL_SAFE_NO_PAD.decode(segments.header).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    // Extract kid as string, rejecting empty values
    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    Ok(kid)
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// Rejects tokens with `iat` more than `clock_skew` in the future.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
///
/// Prefer [`validate_iat`] in production code. This variant exists so that
/// boundary conditions can be unit-tested without wall-clock dependence.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds), well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Decode a base64url-encoded unsigned big-endian integer.
///
/// JWK RSA members (`n`, `e`) are unsigned integers in base64url without
/// padding (RFC 7518 §6.3.1). Trailing `=` padding is tolerated. Leading
/// zero bytes are stripped so that the result is the minimal big-endian
/// magnitude; an all-zero input therefore decodes to an empty vector.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the content is not valid base64url.
pub fn decode_unsigned_component(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('='))?;
    let first_significant = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len());

    Ok(bytes.into_iter().skip(first_significant).collect())
}

/// Number of significant bits in a big-endian unsigned magnitude.
///
/// Expects the minimal form produced by [`decode_unsigned_component`].
#[must_use]
pub fn significant_bits(magnitude: &[u8]) -> usize {
    match magnitude.first() {
        Some(leading) => {
            let leading_bits = 8 - leading.leading_zeros() as usize;
            (magnitude.len() - 1) * 8 + leading_bits
        }
        None => 0,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Constants Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_default_clock_skew_is_5_minutes() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
    }

    #[test]
    fn test_max_clock_skew_is_10_minutes() {
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    // -------------------------------------------------------------------------
    // split_segments Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_split_segments_three_parts() {
        let segments = split_segments("aaa.bbb.ccc").unwrap();
        assert_eq!(segments.header, "aaa");
        assert_eq!(segments.payload, "bbb");
        assert_eq!(segments.signature, "ccc");
    }

    #[test]
    fn test_split_segments_wrong_count() {
        for token in ["", "single", "only.two", "one.two.three.four", "a.b.c.d.e"] {
            assert_eq!(
                split_segments(token),
                Err(JwtValidationError::MalformedToken),
                "token {token:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_split_segments_allows_empty_segments() {
        // Shape check only; emptiness is caught by decoding later
        let segments = split_segments("..").unwrap();
        assert_eq!(segments.header, "");
        assert_eq!(segments.signature, "");
    }

    #[test]
    fn test_split_segments_oversized() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            split_segments(&oversized),
            Err(JwtValidationError::TokenTooLarge)
        );
    }

    // -------------------------------------------------------------------------
    // extract_kid Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_kid_valid_token() {
        let header = r#"{"alg":"RS256","typ":"JWT","kid":"ins_2abc"}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        assert_eq!(extract_kid(&token).unwrap(), "ins_2abc");
    }

    #[test]
    fn test_extract_kid_missing_kid() {
        let header = r#"{"alg":"RS256","typ":"JWT"}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        assert!(matches!(
            extract_kid(&token),
            Err(JwtValidationError::MissingKid)
        ));
    }

    #[test]
    fn test_extract_kid_empty_kid() {
        let header = r#"{"alg":"RS256","kid":""}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        assert!(matches!(
            extract_kid(&token),
            Err(JwtValidationError::MissingKid)
        ));
    }

    #[test]
    fn test_extract_kid_non_string_kid() {
        let header = r#"{"alg":"RS256","typ":"JWT","kid":12345}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        assert!(matches!(
            extract_kid(&token),
            Err(JwtValidationError::MissingKid)
        ));
    }

    #[test]
    fn test_extract_kid_malformed_token() {
        assert!(matches!(
            extract_kid("not-a-jwt"),
            Err(JwtValidationError::MalformedToken)
        ));
        assert!(matches!(
            extract_kid(""),
            Err(JwtValidationError::MalformedToken)
        ));
    }

    #[test]
    fn test_extract_kid_invalid_base64() {
        assert!(matches!(
            extract_kid("!!!invalid!!!.payload.signature"),
            Err(JwtValidationError::MalformedToken)
        ));
    }

    #[test]
    fn test_extract_kid_invalid_json() {
        let header_b64 = URL_SAFE_NO_PAD.encode("not-json");
        let token = format!("{header_b64}.payload.signature");

        assert!(matches!(
            extract_kid(&token),
            Err(JwtValidationError::MalformedToken)
        ));
    }

    #[test]
    fn test_extract_kid_empty_header_segment() {
        assert!(matches!(
            extract_kid(".payload.signature"),
            Err(JwtValidationError::MalformedToken)
        ));
    }

    #[test]
    fn test_extract_kid_at_size_limit() {
        let header = r#"{"alg":"RS256","typ":"JWT","kid":"key"}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        // header.payload.signature (2 dots)
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2;
        let payload_len = remaining / 2;
        let sig_len = remaining - payload_len;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(payload_len),
            "b".repeat(sig_len)
        );

        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);
        assert_eq!(extract_kid(&token).unwrap(), "key");
    }

    #[test]
    fn test_extract_kid_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert!(matches!(
            extract_kid(&oversized),
            Err(JwtValidationError::TokenTooLarge)
        ));
    }

    // -------------------------------------------------------------------------
    // validate_iat Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_current_time() {
        let now = chrono::Utc::now().timestamp();
        assert!(validate_iat(now, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_past_time() {
        let past = chrono::Utc::now().timestamp() - 3600;
        assert!(validate_iat(past, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_far_future() {
        let far_future = chrono::Utc::now().timestamp() + 86400;
        assert!(matches!(
            validate_iat(far_future, DEFAULT_CLOCK_SKEW),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }

    #[test]
    fn test_validate_iat_at_boundary_exact() {
        let now = 1_700_000_000_i64;

        // iat == now + skew is the last accepted value
        assert!(validate_iat_at(now + 300, DEFAULT_CLOCK_SKEW, now).is_ok());

        // iat == now + skew + 1 is the first rejected value
        assert!(matches!(
            validate_iat_at(now + 301, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }

    // -------------------------------------------------------------------------
    // Unsigned component Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_decode_unsigned_component_standard_exponent() {
        // 65537
        assert_eq!(decode_unsigned_component("AQAB").unwrap(), vec![1, 0, 1]);
    }

    #[test]
    fn test_decode_unsigned_component_strips_leading_zeros() {
        // 0x00 0x80 0x01: the zero byte a signed encoder would add for the high bit
        let encoded = URL_SAFE_NO_PAD.encode([0x00, 0x80, 0x01]);
        assert_eq!(
            decode_unsigned_component(&encoded).unwrap(),
            vec![0x80, 0x01]
        );
    }

    #[test]
    fn test_decode_unsigned_component_high_bit_is_not_sign() {
        let encoded = URL_SAFE_NO_PAD.encode([0xff, 0xfe]);
        assert_eq!(decode_unsigned_component(&encoded).unwrap(), vec![0xff, 0xfe]);
    }

    #[test]
    fn test_decode_unsigned_component_tolerates_padding() {
        assert_eq!(decode_unsigned_component("AQAB==").unwrap(), vec![1, 0, 1]);
        assert_eq!(decode_unsigned_component("AQ==").unwrap(), vec![1]);
    }

    #[test]
    fn test_decode_unsigned_component_all_zero_is_empty() {
        let encoded = URL_SAFE_NO_PAD.encode([0u8, 0, 0]);
        assert!(decode_unsigned_component(&encoded).unwrap().is_empty());
    }

    #[test]
    fn test_decode_unsigned_component_rejects_standard_alphabet() {
        // '+' and '/' are not part of the URL-safe alphabet
        assert!(decode_unsigned_component("ab+/").is_err());
    }

    #[test]
    fn test_decode_unsigned_component_rejects_garbage() {
        assert!(decode_unsigned_component("!!!not-base64!!!").is_err());
    }

    #[test]
    fn test_significant_bits() {
        assert_eq!(significant_bits(&[]), 0);
        assert_eq!(significant_bits(&[0x01]), 1);
        assert_eq!(significant_bits(&[0x01, 0x00, 0x01]), 17);
        assert_eq!(significant_bits(&[0x80, 0x00]), 16);
        assert_eq!(significant_bits(&[0xc3; 256]), 2048);
    }
}
