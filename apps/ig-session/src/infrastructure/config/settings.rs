//! Session Monitor Configuration Settings
//!
//! Configuration types for the session authority and the monitor binary,
//! loaded from environment variables.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::session::{Credentials, SessionToken};
use crate::infrastructure::broadcast::DEFAULT_STATUS_CAPACITY;

/// IG session lifetime ceiling used when seeding credentials (6 hours).
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// IG trading environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Demo account environment.
    #[default]
    Demo,
    /// Live account environment (real money).
    Live,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "LIVE" => Self::Live,
            _ => Self::Demo,
        }
    }

    /// Check if this is the live environment.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Live => "live",
        }
    }

    /// Base URL of the REST gateway.
    #[must_use]
    pub const fn api_base_url(&self) -> &'static str {
        match self {
            Self::Demo => "https://demo-api.ig.com/gateway/deal",
            Self::Live => "https://api.ig.com/gateway/deal",
        }
    }
}

/// Session authority settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// How long before the real expiry a session is treated as expired.
    pub expiry_lead: Duration,
    /// Capacity of the status broadcast channel.
    pub status_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            expiry_lead: Duration::from_secs(5),
            status_capacity: DEFAULT_STATUS_CAPACITY,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Credentials obtained out of band and handed to the monitor at start.
#[derive(Debug, Clone)]
pub struct SeedCredentials {
    /// Account the tokens belong to.
    pub account_id: String,
    /// Token material.
    pub token: SessionToken,
    /// Remaining lifetime of the tokens.
    pub ttl: Duration,
}

/// Complete monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Trading environment.
    pub environment: Environment,
    /// Application API key.
    pub api_key: String,
    /// Session authority settings.
    pub session: SessionSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Optional pre-existing session.
    pub seed: Option<SeedCredentials>,
}

impl MonitorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = required(&lookup, "IG_API_KEY")?;

        let environment = lookup("IG_ENVIRONMENT")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let session = SessionSettings {
            expiry_lead: parse_duration_millis(
                &lookup,
                "IG_SESSION_EXPIRY_LEAD_MS",
                SessionSettings::default().expiry_lead,
            ),
            status_capacity: parse_or(
                &lookup,
                "IG_SESSION_STATUS_CAPACITY",
                SessionSettings::default().status_capacity,
            ),
        };

        let server = ServerSettings {
            health_port: parse_or(
                &lookup,
                "IG_SESSION_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let seed = seed_token(&lookup)
            .map(|token| -> Result<SeedCredentials, ConfigError> {
                Ok(SeedCredentials {
                    account_id: required(&lookup, "IG_ACCOUNT_ID")?,
                    token,
                    ttl: parse_duration_secs(&lookup, "IG_SESSION_TTL_SECS", DEFAULT_SESSION_TTL),
                })
            })
            .transpose()?;

        Ok(Self {
            environment,
            api_key,
            session,
            server,
            seed,
        })
    }

    /// Build the seeded credentials, expiring `ttl` after `now`.
    #[must_use]
    pub fn seed_credentials(&self, now: DateTime<Utc>) -> Option<Credentials> {
        self.seed.as_ref().map(|seed| {
            Credentials::new(
                self.api_key.clone(),
                seed.account_id.clone(),
                seed.token.clone(),
                now,
            )
            .expiring_in(seed.ttl, now)
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Prefer OAuth tokens, fall back to the v2 header pair.
fn seed_token<F>(lookup: &F) -> Option<SessionToken>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(access_token) = non_empty("IG_ACCESS_TOKEN") {
        return Some(SessionToken::OAuth {
            access_token,
            refresh_token: non_empty("IG_REFRESH_TOKEN").unwrap_or_default(),
            token_type: non_empty("IG_TOKEN_TYPE").unwrap_or_else(|| "Bearer".to_string()),
            scope: non_empty("IG_TOKEN_SCOPE").unwrap_or_else(|| "profile".to_string()),
        });
    }

    Some(SessionToken::Certificate {
        cst: non_empty("IG_CST")?,
        security_token: non_empty("IG_SECURITY_TOKEN")?,
    })
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
