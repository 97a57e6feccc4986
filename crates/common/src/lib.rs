//! Common utilities and types shared across NIL platform components.

#![warn(clippy::pedantic)]

/// Module for JWT primitives (size limits, segment parsing, key components)
pub mod jwt;
