//! # NIL Test Utilities
//!
//! Shared test utilities for the NIL API.
//!
//! This crate provides:
//! - Fixed RSA signing keys (`crypto_fixtures`)
//! - A bearer-token builder (`token_builders`)
//! - A mock key-set endpoint (`jwks_mock`)
//! - Identity store doubles (`identity_stores`)
//! - Router and server harness over an in-memory store (`server_harness`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nil_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let jwks = MockJwksServer::with_keys(&[&PRIMARY_KEY]).await;
//!     let server = TestApiServer::spawn(test_config(&jwks.url())).await?;
//!     let token = TokenBuilder::new("user_abc123").issuer(TEST_ISSUER).sign(&PRIMARY_KEY);
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/v1/users/me", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod identity_stores;
pub mod jwks_mock;
pub mod server_harness;
pub mod token_builders;

pub use crypto_fixtures::*;
pub use identity_stores::*;
pub use jwks_mock::*;
pub use server_harness::*;
pub use token_builders::*;
