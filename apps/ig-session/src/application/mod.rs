//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the session authority and the port interfaces
//! that define how it interacts with the outside world.

/// Port interfaces for external systems (clock).
pub mod ports;

/// Application services (session authority).
pub mod services;
