//! Session Domain Types
//!
//! Credentials, session status and the expiry clock guard. Everything in
//! here is synchronous and free of runtime dependencies.

pub mod clock;
mod credentials;
mod status;

pub use credentials::{
    ACCOUNT_ID_HEADER, API_KEY_HEADER, AUTHORIZATION_HEADER, CST_HEADER, Credentials,
    SECURITY_TOKEN_HEADER, SessionToken,
};
pub use status::SessionStatus;
