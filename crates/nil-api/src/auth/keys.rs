//! RSA public key reconstruction from published key records.
//!
//! The identity provider publishes each signing key as a base64url modulus
//! and exponent. Both are unsigned big-endian integers; a high bit in the
//! first byte is magnitude, not sign.

use common::jwt::{decode_unsigned_component, significant_bits};
use jsonwebtoken::DecodingKey;
use std::fmt;
use thiserror::Error;

/// Smallest modulus accepted for signature verification.
pub const MIN_RSA_MODULUS_BITS: usize = 2048;

/// A signing key as published by the provider, before reconstruction.
///
/// `modulus` and `exponent` hold the base64url text exactly as published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub key_id: String,
    pub modulus: String,
    pub exponent: String,
}

impl KeyRecord {
    pub fn new(
        key_id: impl Into<String>,
        modulus: impl Into<String>,
        exponent: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            modulus: modulus.into(),
            exponent: exponent.into(),
        }
    }

    /// Reconstruct the RSA public key described by this record.
    pub fn reconstruct(&self) -> Result<RsaPublicKey, KeyConstructionError> {
        reconstruct(&self.modulus, &self.exponent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyConstructionError {
    #[error("Modulus is not valid base64url")]
    InvalidModulus,

    #[error("Exponent is not valid base64url")]
    InvalidExponent,

    #[error("Modulus is zero")]
    ZeroModulus,

    #[error("Exponent is zero")]
    ZeroExponent,

    #[error("Modulus is {bits} bits, minimum is {MIN_RSA_MODULUS_BITS}")]
    ModulusTooSmall { bits: usize },
}

/// Reconstructed RSA public key, ready for signature verification.
#[derive(Clone)]
pub struct RsaPublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
    decoding_key: DecodingKey,
}

impl RsaPublicKey {
    /// Minimal big-endian modulus bytes.
    #[cfg(test)]
    pub(crate) fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// Minimal big-endian exponent bytes.
    #[cfg(test)]
    pub(crate) fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    pub fn modulus_bits(&self) -> usize {
        significant_bits(&self.modulus)
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for RsaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPublicKey")
            .field("modulus_bits", &self.modulus_bits())
            .field("exponent", &self.exponent)
            .finish_non_exhaustive()
    }
}

/// Convert a base64url modulus/exponent pair into an RSA public key.
///
/// Trailing `=` padding is tolerated and leading zero bytes are ignored.
///
/// # Errors
///
/// - `InvalidModulus` / `InvalidExponent` - not valid base64url
/// - `ZeroModulus` / `ZeroExponent` - the integer is zero or empty
/// - `ModulusTooSmall` - fewer than [`MIN_RSA_MODULUS_BITS`] significant bits
pub fn reconstruct(
    modulus_encoded: &str,
    exponent_encoded: &str,
) -> Result<RsaPublicKey, KeyConstructionError> {
    let modulus = decode_unsigned_component(modulus_encoded).map_err(|e| {
        tracing::debug!(target: "nil.auth.keys", error = %e, "Failed to decode modulus");
        KeyConstructionError::InvalidModulus
    })?;
    let exponent = decode_unsigned_component(exponent_encoded).map_err(|e| {
        tracing::debug!(target: "nil.auth.keys", error = %e, "Failed to decode exponent");
        KeyConstructionError::InvalidExponent
    })?;

    if modulus.is_empty() {
        return Err(KeyConstructionError::ZeroModulus);
    }
    if exponent.is_empty() {
        return Err(KeyConstructionError::ZeroExponent);
    }

    let bits = significant_bits(&modulus);
    if bits < MIN_RSA_MODULUS_BITS {
        return Err(KeyConstructionError::ModulusTooSmall { bits });
    }

    let decoding_key = DecodingKey::from_rsa_raw_components(&modulus, &exponent);

    Ok(RsaPublicKey {
        modulus,
        exponent,
        decoding_key,
    })
}
