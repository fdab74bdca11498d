//! Expiry Clock Guard
//!
//! Pure predicates deciding whether a credential deadline has already
//! passed and how long the expiration alarm should wait. Both apply the
//! same lead margin so a credential is never reported `Ready` inside the
//! window where the alarm would already have fired.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Convert a lead margin to a signed delta, saturating on overflow.
fn lead_delta(lead: Duration) -> TimeDelta {
    TimeDelta::from_std(lead).unwrap_or(TimeDelta::MAX)
}

/// Check whether `expires_at` is at or before `now + lead`.
///
/// An unrepresentable `now + lead` lies beyond every valid instant, so
/// the deadline counts as passed.
#[must_use]
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>, lead: Duration) -> bool {
    now.checked_add_signed(lead_delta(lead))
        .is_none_or(|threshold| expires_at <= threshold)
}

/// Time to wait from `now` before the alarm for `expires_at` fires.
///
/// Returns [`Duration::ZERO`] when `expires_at - lead` is already behind us.
#[must_use]
pub fn alarm_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>, lead: Duration) -> Duration {
    expires_at
        .signed_duration_since(now)
        .checked_sub(&lead_delta(lead))
        .and_then(|delay| delay.to_std().ok())
        .unwrap_or(Duration::ZERO)
}
