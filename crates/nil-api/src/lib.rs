//! NIL API Service Library
//!
//! Backend for the NIL platform. Authenticates bearer tokens issued by an
//! external identity provider and keeps a local identity record for every
//! authenticated caller.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//!                        |
//!                        v
//!                  auth/{jwks,keys,jwt}.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key-set cache, key reconstruction, token verification
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication gate and HTTP metrics
//! - `models` - Roles, identities and response bodies
//! - `observability` - Prometheus metrics
//! - `repositories` - Identity storage (PostgreSQL and in-memory)
//! - `routes` - Axum router setup
//! - `services` - Identity synchronization

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
