//! Repository layer for identity persistence.

pub mod memory;
#[cfg(test)]
pub(crate) mod unavailable;
pub mod users;

pub use memory::InMemoryIdentityStore;
pub use users::{IdentityStore, PgIdentityStore, UpsertOutcome};
