//! Inbound token verification.
//!
//! - `keys`: RSA public key reconstruction from published modulus/exponent
//! - `jwks`: key-set fetching and caching
//! - `jwt`: signature and claim verification
//! - `claims`: token claim set
//! - `context`: request-scoped authorization context

pub mod claims;
pub mod context;
pub mod jwks;
pub mod jwt;
pub mod keys;

pub use claims::TokenClaims;
pub use context::{AuthorizationContext, BASE_AUTHORITY};
pub use jwks::{HttpKeySetFetcher, KeySetCache, KeySetFetchError, KeySetSource};
pub use jwt::{TokenVerifier, VerificationError};
pub use keys::{reconstruct, KeyConstructionError, KeyRecord, RsaPublicKey};
