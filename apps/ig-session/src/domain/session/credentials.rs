//! IG Session Credentials
//!
//! Authentication material returned by the IG login endpoints together
//! with the instant it stops being valid.
//!
//! IG issues two kinds of session tokens:
//!
//! - **v2 login**: `CST` and `X-SECURITY-TOKEN` response headers, sent back
//!   verbatim on every request.
//! - **v3 login**: an OAuth access token sent as `Authorization: Bearer ...`
//!   together with the `IG-ACCOUNT-ID` header.
//!
//! Both variants additionally require the `X-IG-API-KEY` header.
//! The `Debug` implementations redact every secret for safe logging.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Header Names
// =============================================================================

/// Application API key header.
pub const API_KEY_HEADER: &str = "X-IG-API-KEY";

/// Client session token header (v2).
pub const CST_HEADER: &str = "CST";

/// Account security token header (v2).
pub const SECURITY_TOKEN_HEADER: &str = "X-SECURITY-TOKEN";

/// Bearer authorization header (v3).
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Active account header (v3).
pub const ACCOUNT_ID_HEADER: &str = "IG-ACCOUNT-ID";

// =============================================================================
// Session Token
// =============================================================================

/// Token material for an authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionToken {
    /// Header tokens issued by the v2 session endpoint.
    Certificate {
        /// Client session token (`CST`).
        cst: String,
        /// Account security token (`X-SECURITY-TOKEN`).
        security_token: String,
    },

    /// OAuth tokens issued by the v3 session endpoint.
    #[serde(rename = "oauth")]
    OAuth {
        /// Access token attached to requests.
        access_token: String,
        /// Refresh token, kept for the renewal flow.
        refresh_token: String,
        /// Token type, `Bearer` in practice.
        token_type: String,
        /// Granted scope.
        scope: String,
    },
}

impl SessionToken {
    /// Token kind name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Certificate { .. } => "certificate",
            Self::OAuth { .. } => "oauth",
        }
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Certificate { .. } => f
                .debug_struct("Certificate")
                .field("cst", &"[REDACTED]")
                .field("security_token", &"[REDACTED]")
                .finish(),
            Self::OAuth {
                token_type, scope, ..
            } => f
                .debug_struct("OAuth")
                .field("access_token", &"[REDACTED]")
                .field("refresh_token", &"[REDACTED]")
                .field("token_type", token_type)
                .field("scope", scope)
                .finish(),
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Credentials of an authenticated IG session.
///
/// Owned by the session authority once handed in; everybody else only
/// sees clones.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    api_key: String,
    account_id: String,
    client_id: Option<String>,
    streamer_url: Option<String>,
    token: SessionToken,
    expires_at: DateTime<Utc>,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Application API key
    /// * `account_id` - Active trading account
    /// * `token` - Session token material
    /// * `expires_at` - Instant after which the token is no longer valid
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        account_id: impl Into<String>,
        token: SessionToken,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            account_id: account_id.into(),
            client_id: None,
            streamer_url: None,
            token,
            expires_at,
        }
    }

    /// Set the client identifier returned by the login endpoint.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the Lightstreamer endpoint returned by the login endpoint.
    #[must_use]
    pub fn with_streamer_url(mut self, streamer_url: impl Into<String>) -> Self {
        self.streamer_url = Some(streamer_url.into());
        self
    }

    /// Copy with a different expiration instant.
    #[must_use]
    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Copy expiring `ttl` after `now`.
    ///
    /// Login responses carry a lifetime (`expires_in`) rather than an
    /// instant. A lifetime that does not fit the calendar saturates to the
    /// latest representable instant.
    #[must_use]
    pub fn expiring_in(self, ttl: std::time::Duration, now: DateTime<Utc>) -> Self {
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.with_expiration(expires_at)
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the active account identifier.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Get the client identifier, if known.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Get the Lightstreamer endpoint, if known.
    #[must_use]
    pub fn streamer_url(&self) -> Option<&str> {
        self.streamer_url.as_deref()
    }

    /// Get the token material.
    #[must_use]
    pub const fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Get the expiration instant.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Time left until expiry, negative once expired.
    #[must_use]
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> TimeDelta {
        self.expires_at.signed_duration_since(now)
    }

    /// Header name/value pairs that authenticate a request.
    #[must_use]
    pub fn authorization_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![(API_KEY_HEADER, self.api_key.clone())];

        match &self.token {
            SessionToken::Certificate {
                cst,
                security_token,
            } => {
                headers.push((CST_HEADER, cst.clone()));
                headers.push((SECURITY_TOKEN_HEADER, security_token.clone()));
            }
            SessionToken::OAuth {
                access_token,
                token_type,
                ..
            } => {
                headers.push((AUTHORIZATION_HEADER, format!("{token_type} {access_token}")));
                headers.push((ACCOUNT_ID_HEADER, self.account_id.clone()));
            }
        }

        headers
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("client_id", &self.client_id)
            .field("streamer_url", &self.streamer_url)
            .field("token", &self.token)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
