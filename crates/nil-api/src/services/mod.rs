//! Service layer for the NIL API.
//!
//! - `identity_sync` - upsert of verified identities and role assignment

pub mod identity_sync;

pub use identity_sync::{IdentitySynchronizer, DEFAULT_ROLE};
