//! Application Services
//!
//! - `authority`: The session credential authority

pub mod authority;

pub use authority::{
    DEFAULT_EXPIRY_LEAD, SessionAuthority, SessionConfig, SessionError, SessionSnapshot,
};
