//! Session Status
//!
//! The externally observable state of a session credential authority.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current state of the client session.
///
/// `LoggedOut` holds exactly when no credentials are stored. `Ready` and
/// `Expired` both imply stored credentials; expired credentials are kept
/// so their token can still be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    /// No credentials are held.
    #[default]
    LoggedOut,

    /// Credentials are held and believed valid until the given instant.
    Ready {
        /// Expiration instant of the held credentials.
        until: DateTime<Utc>,
    },

    /// Credentials are held but no longer valid.
    Expired,
}

impl SessionStatus {
    /// Check if the session can be used for requests.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Check if the held credentials have expired.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }

    /// Check if no credentials are held.
    #[must_use]
    pub const fn is_logged_out(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }

    /// Expiration instant while `Ready`.
    #[must_use]
    pub const fn until(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Ready { until } => Some(*until),
            Self::LoggedOut | Self::Expired => None,
        }
    }

    /// Status name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LoggedOut => "logged_out",
            Self::Ready { .. } => "ready",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready { until } => write!(f, "ready until {}", until.to_rfc3339()),
            Self::LoggedOut | Self::Expired => f.write_str(self.as_str()),
        }
    }
}
