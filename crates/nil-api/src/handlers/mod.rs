//! HTTP handlers for the NIL API.

pub mod admin;
pub mod health;
pub mod me;
pub mod metrics;

pub use admin::assign_role;
pub use health::health_check;
pub use me::get_me;
pub use metrics::metrics_handler;
