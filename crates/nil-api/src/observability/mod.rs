//! Observability for the NIL API.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
