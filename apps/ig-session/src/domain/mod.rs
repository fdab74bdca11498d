//! Domain Layer - Core session types.
//!
//! This layer contains the credential and status types with no runtime
//! dependencies. All types here are pure Rust with serialization support.

/// Session credentials, status and expiry predicates.
pub mod session;
