//! Port Interfaces
//!
//! Defines the interfaces (ports) the session authority depends on. These
//! are the contracts that infrastructure adapters and tests implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Clock`: Source of the current wall-clock time used to judge expiry

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Credential expiry instants come from the server's wall clock, so the
/// authority compares them against wall-clock time rather than a
/// monotonic clock.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
