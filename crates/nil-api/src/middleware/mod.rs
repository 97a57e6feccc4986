//! Middleware for the NIL API.
//!
//! - `auth` - authentication gate and per-route authorization policy
//! - `cors` - cross-origin policy for the browser frontend
//! - `http_metrics` - HTTP request metrics

pub mod auth;
pub mod cors;
pub mod http_metrics;

pub use auth::{
    authenticate, require_authenticated, require_authority, AuthenticationGate,
    AuthorizationContextExt, Rejection,
};
pub use cors::cors_layer;
pub use http_metrics::http_metrics_middleware;
