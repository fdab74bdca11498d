//! Session Credential Authority
//!
//! Holds the client's current credentials, tracks their expiration and
//! broadcasts status transitions. Outgoing requests read the credentials,
//! the login flow writes them, and an expiration alarm flips the status to
//! `Expired` on its own; all three contend for one mutex.
//!
//! # Transactional Update
//!
//! Every mutation goes through [`SessionAuthority::update_credentials`]:
//!
//! 1. Lock the state and run the caller's transform on the current value
//! 2. Compare the old and new expiration instants
//! 3. Recompute the status and cancel or re-arm the alarm
//! 4. Release the state lock, then emit the status change (if any)
//!
//! Only the expiration instant decides whether anything observable
//! changed. Rotating a token without moving its expiry emits nothing.
//!
//! # State Machine
//!
//! ```text
//! LoggedOut      ── set(future) ──────► Ready(t)
//! Ready(t)       ── alarm at t - lead ─► Expired
//! Ready(t)       ── set(past) ────────► Expired
//! Expired        ── set(future) ──────► Ready(t')
//! Ready, Expired ── set(none) ────────► LoggedOut
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::application::ports::{Clock, SystemClock};
use crate::domain::session::{Credentials, SessionStatus, clock};
use crate::infrastructure::broadcast::{DEFAULT_STATUS_CAPACITY, StatusBroadcaster, StatusStream};
use crate::infrastructure::config::SessionSettings;
use crate::infrastructure::metrics;
use crate::infrastructure::scheduler::ExpirationScheduler;

// =============================================================================
// Configuration
// =============================================================================

/// Default lead margin applied before the real expiry.
pub const DEFAULT_EXPIRY_LEAD: Duration = Duration::from_secs(5);

/// Configuration for a session authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Margin subtracted from the expiry instant, both for arming the
    /// alarm and for treating nearly-expired credentials as expired.
    pub expiry_lead: Duration,
    /// Capacity of the status broadcast channel.
    pub status_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_lead: DEFAULT_EXPIRY_LEAD,
            status_capacity: DEFAULT_STATUS_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with the given lead margin.
    #[must_use]
    pub fn with_expiry_lead(expiry_lead: Duration) -> Self {
        Self {
            expiry_lead,
            ..Self::default()
        }
    }
}

impl From<SessionSettings> for SessionConfig {
    fn from(settings: SessionSettings) -> Self {
        Self {
            expiry_lead: settings.expiry_lead,
            status_capacity: settings.status_capacity,
        }
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the session authority itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The authority was used after teardown.
    #[error("session authority has been torn down")]
    Closed,

    /// No credentials are held.
    #[error("no session: log in before making authenticated requests")]
    NoSession,

    /// Construction outside a tokio runtime.
    #[error("session authority requires a tokio runtime")]
    NoRuntime,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of an authority for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Authority instance identifier.
    pub authority_id: Uuid,
    /// Current status.
    #[serde(flatten)]
    pub status: SessionStatus,
    /// Seconds until the held credentials expire, if any are held.
    pub seconds_until_expiry: Option<i64>,
    /// Live status subscribers.
    pub subscribers: usize,
    /// Whether the authority has been torn down.
    pub closed: bool,
}

// =============================================================================
// Shared State
// =============================================================================

/// Everything guarded by the state mutex.
struct SessionState {
    credentials: Option<Credentials>,
    status: SessionStatus,
    scheduler: ExpirationScheduler,
    /// Identifies the most recently armed alarm.
    alarm_epoch: u64,
    closed: bool,
}

struct Shared {
    id: Uuid,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
    /// Taken before the state lock is released so emissions leave in the
    /// order their critical sections completed.
    emission: Mutex<()>,
    broadcaster: StatusBroadcaster,
}

impl Shared {
    /// Store `next` and recompute status and alarm.
    ///
    /// Returns the status to emit, if any. Must be called with the state
    /// lock held.
    fn transition(
        this: &Arc<Self>,
        state: &mut SessionState,
        next: Option<Credentials>,
    ) -> Option<SessionStatus> {
        let previous = state.status;
        let old_expiry = state.credentials.as_ref().map(Credentials::expires_at);
        let new_expiry = next.as_ref().map(Credentials::expires_at);
        state.credentials = next;

        let expires_at = match (old_expiry, new_expiry) {
            (None, None) => return None,
            (Some(_), None) => {
                state.scheduler.cancel();
                state.status = SessionStatus::LoggedOut;
                return Some(SessionStatus::LoggedOut);
            }
            (old, Some(new)) if old == Some(new) => return None,
            (_, Some(new)) => new,
        };

        state.scheduler.cancel();
        let now = this.clock.now();
        let lead = this.config.expiry_lead;

        if clock::is_expired(expires_at, now, lead) {
            state.status = SessionStatus::Expired;
            return (previous != SessionStatus::Expired).then_some(SessionStatus::Expired);
        }

        state.alarm_epoch = state.alarm_epoch.wrapping_add(1);
        let epoch = state.alarm_epoch;
        let weak: Weak<Self> = Arc::downgrade(this);
        state
            .scheduler
            .arm(clock::alarm_delay(expires_at, now, lead), move || {
                if let Some(shared) = weak.upgrade() {
                    Self::on_alarm(&shared, epoch);
                }
            });

        state.status = SessionStatus::Ready { until: expires_at };
        Some(state.status)
    }

    /// Alarm fire handler: `Ready -> Expired` if the alarm is still current.
    fn on_alarm(this: &Arc<Self>, epoch: u64) {
        let mut state = this.state.lock();
        if state.closed || state.alarm_epoch != epoch || !state.status.is_ready() {
            tracing::debug!(authority = %this.id, epoch, "Stale expiration alarm ignored");
            return;
        }

        state.scheduler.cancel();
        state.status = SessionStatus::Expired;
        metrics::record_alarm_fired();
        tracing::info!(authority = %this.id, "Session expired");

        this.publish(state, Some(SessionStatus::Expired));
    }

    /// Release the state lock, then emit `change`.
    fn publish(&self, state: MutexGuard<'_, SessionState>, change: Option<SessionStatus>) {
        let Some(status) = change else {
            return;
        };

        let seconds_left = state
            .credentials
            .as_ref()
            .filter(|_| status.is_ready())
            .map(|creds| creds.time_until_expiry(self.clock.now()).num_seconds());

        let _order = self.emission.lock();
        drop(state);

        let delivered = self.broadcaster.emit(status);
        tracing::debug!(
            authority = %self.id,
            status = status.as_str(),
            delivered,
            "Session status emitted"
        );

        metrics::record_transition(status);
        #[allow(clippy::cast_precision_loss)]
        metrics::set_seconds_until_expiry(seconds_left.unwrap_or(0) as f64);
    }
}

// =============================================================================
// Session Authority
// =============================================================================

/// Thread-safe owner of the current session credentials.
///
/// Cloning is cheap and every clone refers to the same authority. The
/// alarm only holds a weak reference, so dropping the last clone cancels
/// the alarm and completes every status stream.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use chrono::Utc;
/// use futures::StreamExt;
/// use ig_session::{Credentials, SessionAuthority, SessionConfig, SessionStatus, SessionToken};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), ig_session::SessionError> {
/// let authority = SessionAuthority::new(SessionConfig::default(), None)?;
/// let mut statuses = authority.status_stream();
///
/// let credentials = Credentials::new(
///     "api-key",
///     "ABC123",
///     SessionToken::Certificate {
///         cst: "cst".to_string(),
///         security_token: "xst".to_string(),
///     },
///     Utc::now(),
/// )
/// .expiring_in(Duration::from_secs(3600), Utc::now());
///
/// authority.set_credentials(Some(credentials))?;
/// assert!(matches!(statuses.next().await, Some(SessionStatus::Ready { .. })));
///
/// authority.teardown();
/// assert_eq!(statuses.next().await, None);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionAuthority {
    shared: Arc<Shared>,
}

impl SessionAuthority {
    /// Create an authority on the current tokio runtime using the system
    /// clock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoRuntime`] when called outside a runtime.
    pub fn new(config: SessionConfig, initial: Option<Credentials>) -> Result<Self, SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        Ok(Self::with_runtime(
            runtime,
            Arc::new(SystemClock),
            config,
            initial,
        ))
    }

    /// Create an authority with an explicit runtime and clock.
    ///
    /// Initial credentials go through the same transition logic as
    /// [`set_credentials`](Self::set_credentials).
    #[must_use]
    pub fn with_runtime(
        runtime: Handle,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
        initial: Option<Credentials>,
    ) -> Self {
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            config,
            clock,
            state: Mutex::new(SessionState {
                credentials: None,
                status: SessionStatus::LoggedOut,
                scheduler: ExpirationScheduler::new(runtime),
                alarm_epoch: 0,
                closed: false,
            }),
            emission: Mutex::new(()),
            broadcaster: StatusBroadcaster::new(config.status_capacity),
        });

        {
            let mut state = shared.state.lock();
            let _ = Shared::transition(&shared, &mut state, initial);
            tracing::debug!(
                authority = %shared.id,
                status = state.status.as_str(),
                lead_ms = config.expiry_lead.as_millis(),
                "Session authority created"
            );
        }

        Self { shared }
    }

    /// Authority instance identifier, used in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.shared.config
    }

    /// Current credentials, including expired ones.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.shared.state.lock().credentials.clone()
    }

    /// Current credentials, or [`SessionError::NoSession`] if none are held.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSession`] when logged out.
    pub fn require_credentials(&self) -> Result<Credentials, SessionError> {
        self.credentials().ok_or(SessionError::NoSession)
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.shared.state.lock().status
    }

    /// Replace the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after [`teardown`](Self::teardown).
    pub fn set_credentials(&self, credentials: Option<Credentials>) -> Result<(), SessionError> {
        self.update_credentials(|_| Ok::<_, SessionError>(credentials))
    }

    /// Transactionally update the credentials.
    ///
    /// `transform` runs under the state lock with the current credentials
    /// and returns the replacement. If it fails, nothing changes and its
    /// error is returned as is. The resulting status change is emitted
    /// after the lock is released.
    ///
    /// `transform` must not call back into this authority.
    ///
    /// # Errors
    ///
    /// Returns the transform's error, or [`SessionError::Closed`]
    /// (converted into `E`) after [`teardown`](Self::teardown).
    pub fn update_credentials<F, E>(&self, transform: F) -> Result<(), E>
    where
        F: FnOnce(Option<&Credentials>) -> Result<Option<Credentials>, E>,
        E: From<SessionError>,
    {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(SessionError::Closed.into());
        }

        let next = transform(state.credentials.as_ref())?;
        let previous = state.status;
        let change = Shared::transition(&self.shared, &mut state, next);

        if let Some(status) = change {
            match status {
                SessionStatus::Ready { until } => tracing::info!(
                    authority = %self.shared.id,
                    from = previous.as_str(),
                    until = %until,
                    "Session ready"
                ),
                SessionStatus::Expired => tracing::info!(
                    authority = %self.shared.id,
                    from = previous.as_str(),
                    "Session credentials already expired"
                ),
                SessionStatus::LoggedOut => tracing::info!(
                    authority = %self.shared.id,
                    from = previous.as_str(),
                    "Session logged out"
                ),
            }
        }

        self.shared.publish(state, change);
        Ok(())
    }

    /// Subscribe to future status transitions.
    #[must_use]
    pub fn status_stream(&self) -> StatusStream {
        let stream = self.shared.broadcaster.subscribe();
        metrics::set_subscribers(self.shared.broadcaster.subscriber_count());
        stream
    }

    /// Health view of the authority.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.shared.state.lock();
        let now = self.shared.clock.now();
        SessionSnapshot {
            authority_id: self.shared.id,
            status: state.status,
            seconds_until_expiry: state
                .credentials
                .as_ref()
                .map(|creds| creds.time_until_expiry(now).num_seconds()),
            subscribers: self.shared.broadcaster.subscriber_count(),
            closed: state.closed,
        }
    }

    /// Check if [`teardown`](Self::teardown) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Expiry instant of the held credentials.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.shared
            .state
            .lock()
            .credentials
            .as_ref()
            .map(Credentials::expires_at)
    }

    /// Time until the pending expiration alarm fires, if one is armed.
    #[must_use]
    pub fn alarm_remaining(&self) -> Option<Duration> {
        self.shared.state.lock().scheduler.remaining()
    }

    /// End the authority's life. Idempotent.
    ///
    /// Cancels the alarm and completes every status stream. Reads keep
    /// working; further updates fail with [`SessionError::Closed`].
    pub fn teardown(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.scheduler.cancel();

        let _order = self.shared.emission.lock();
        drop(state);
        self.shared.broadcaster.close();
        metrics::set_subscribers(0);

        tracing::info!(authority = %self.shared.id, "Session authority torn down");
    }
}

impl fmt::Debug for SessionAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SessionAuthority")
            .field("id", &self.shared.id)
            .field("status", &state.status)
            .field("alarm_armed", &state.scheduler.is_armed())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use futures::{FutureExt, StreamExt};
    use test_case::test_case;

    use super::*;
    use crate::application::ports::MockClock;
    use crate::domain::session::SessionToken;

    const LEAD: Duration = Duration::from_millis(50);

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn fixed_clock() -> Arc<dyn Clock> {
        let mut clock = MockClock::new();
        clock.expect_now().returning(epoch);
        Arc::new(clock)
    }

    fn authority(initial: Option<Credentials>) -> SessionAuthority {
        SessionAuthority::with_runtime(
            Handle::current(),
            fixed_clock(),
            SessionConfig::with_expiry_lead(LEAD),
            initial,
        )
    }

    fn creds_expiring(offset_ms: i64) -> Credentials {
        Credentials::new(
            "key",
            "ABC123",
            SessionToken::Certificate {
                cst: "cst".to_string(),
                security_token: "xst".to_string(),
            },
            epoch() + TimeDelta::milliseconds(offset_ms),
        )
    }

    fn ready_at(offset_ms: i64) -> SessionStatus {
        SessionStatus::Ready {
            until: epoch() + TimeDelta::milliseconds(offset_ms),
        }
    }

    /// Drain whatever is buffered without waiting for more.
    fn drain(stream: &mut StatusStream) -> Vec<SessionStatus> {
        let mut seen = Vec::new();
        while let Some(Some(status)) = stream.next().now_or_never() {
            seen.push(status);
        }
        seen
    }

    #[test_case(None, SessionStatus::LoggedOut; "no credentials")]
    #[test_case(Some(2_000), ready_at(2_000); "future credentials")]
    #[test_case(Some(50), SessionStatus::Expired; "inside lead")]
    #[test_case(Some(-1_000), SessionStatus::Expired; "past credentials")]
    #[tokio::test]
    async fn initial_status(offset_ms: Option<i64>, expected: SessionStatus) {
        let authority = authority(offset_ms.map(creds_expiring));
        assert_eq!(authority.status(), expected);
        assert_eq!(authority.credentials().is_some(), offset_ms.is_some());
    }

    #[test_case(2_000, ready_at(2_000); "ready")]
    #[test_case(-5, SessionStatus::Expired; "expired")]
    #[tokio::test]
    async fn login_from_logged_out(offset_ms: i64, expected: SessionStatus) {
        let authority = authority(None);
        let mut stream = authority.status_stream();

        authority
            .set_credentials(Some(creds_expiring(offset_ms)))
            .unwrap();

        assert_eq!(authority.status(), expected);
        assert_eq!(drain(&mut stream), vec![expected]);
    }

    #[tokio::test]
    async fn same_expiry_is_silent_but_stores_new_token() {
        let authority = authority(Some(creds_expiring(2_000)));
        let mut stream = authority.status_stream();

        let rotated = Credentials::new(
            "key",
            "ABC123",
            SessionToken::Certificate {
                cst: "rotated".to_string(),
                security_token: "rotated".to_string(),
            },
            epoch() + TimeDelta::milliseconds(2_000),
        );
        authority.set_credentials(Some(rotated.clone())).unwrap();

        assert!(drain(&mut stream).is_empty());
        assert_eq!(authority.credentials(), Some(rotated));
        assert_eq!(authority.status(), ready_at(2_000));
    }

    #[tokio::test]
    async fn logout_from_logged_out_is_silent() {
        let authority = authority(None);
        let mut stream = authority.status_stream();

        authority.set_credentials(None).unwrap();

        assert!(drain(&mut stream).is_empty());
        assert_eq!(authority.status(), SessionStatus::LoggedOut);
    }

    #[test_case(2_000; "from ready")]
    #[test_case(-2_000; "from expired")]
    #[tokio::test]
    async fn logout_emits_once(offset_ms: i64) {
        let authority = authority(Some(creds_expiring(offset_ms)));
        let mut stream = authority.status_stream();

        authority.set_credentials(None).unwrap();

        assert_eq!(drain(&mut stream), vec![SessionStatus::LoggedOut]);
        assert!(authority.credentials().is_none());
        assert!(authority.alarm_remaining().is_none());
    }

    #[tokio::test]
    async fn expired_to_expired_is_silent() {
        let authority = authority(Some(creds_expiring(-2_000)));
        let mut stream = authority.status_stream();

        authority
            .set_credentials(Some(creds_expiring(-1_000)))
            .unwrap();

        assert!(drain(&mut stream).is_empty());
        assert_eq!(authority.status(), SessionStatus::Expired);
        assert_eq!(
            authority.expires_at(),
            Some(epoch() - TimeDelta::milliseconds(1_000))
        );
    }

    #[tokio::test]
    async fn ready_to_expired_cancels_alarm() {
        let authority = authority(Some(creds_expiring(2_000)));
        assert!(authority.alarm_remaining().is_some());

        authority.set_credentials(Some(creds_expiring(0))).unwrap();

        assert_eq!(authority.status(), SessionStatus::Expired);
        assert!(authority.alarm_remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ready_arms_alarm_at_expiry_minus_lead() {
        let authority = authority(None);
        authority
            .set_credentials(Some(creds_expiring(2_000)))
            .unwrap();

        assert_eq!(
            authority.alarm_remaining(),
            Some(Duration::from_millis(1_950))
        );
    }

    #[tokio::test]
    async fn transform_error_leaves_state_untouched() {
        #[derive(Debug, PartialEq, Eq)]
        enum LoginError {
            Rejected,
            Session(SessionError),
        }

        impl From<SessionError> for LoginError {
            fn from(err: SessionError) -> Self {
                Self::Session(err)
            }
        }

        let original = creds_expiring(2_000);
        let authority = authority(Some(original.clone()));
        let mut stream = authority.status_stream();

        let result = authority.update_credentials(|current| {
            assert_eq!(current, Some(&original));
            Err(LoginError::Rejected)
        });

        assert_eq!(result, Err(LoginError::Rejected));
        assert_eq!(authority.credentials(), Some(original));
        assert_eq!(authority.status(), ready_at(2_000));
        assert!(drain(&mut stream).is_empty());
    }

    #[tokio::test]
    async fn transform_sees_current_value() {
        let authority = authority(Some(creds_expiring(2_000)));

        authority
            .update_credentials(|current| {
                Ok::<_, SessionError>(
                    current.map(|creds| creds.clone().with_client_id("client-7")),
                )
            })
            .unwrap();

        let creds = authority.credentials().unwrap();
        assert_eq!(creds.client_id(), Some("client-7"));
    }

    #[tokio::test]
    async fn teardown_rejects_updates_but_allows_reads() {
        let authority = authority(Some(creds_expiring(2_000)));
        authority.teardown();
        authority.teardown();

        assert!(authority.is_closed());
        assert_eq!(authority.set_credentials(None), Err(SessionError::Closed));
        assert!(authority.credentials().is_some());
        assert!(authority.alarm_remaining().is_none());

        let mut called = false;
        let result = authority.update_credentials(|_| {
            called = true;
            Ok::<_, SessionError>(None)
        });
        assert_eq!(result, Err(SessionError::Closed));
        assert!(!called);
    }

    #[tokio::test]
    async fn require_credentials_reports_no_session() {
        let authority = authority(None);
        assert_eq!(
            authority.require_credentials(),
            Err(SessionError::NoSession)
        );

        authority
            .set_credentials(Some(creds_expiring(2_000)))
            .unwrap();
        assert!(authority.require_credentials().is_ok());
    }

    #[tokio::test]
    async fn snapshot_reports_expiry_and_subscribers() {
        let authority = authority(Some(creds_expiring(90_000)));
        let _stream = authority.status_stream();

        let snapshot = authority.snapshot();
        assert_eq!(snapshot.authority_id, authority.id());
        assert_eq!(snapshot.status, ready_at(90_000));
        assert_eq!(snapshot.seconds_until_expiry, Some(90));
        assert_eq!(snapshot.subscribers, 1);
        assert!(!snapshot.closed);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["seconds_until_expiry"], 90);
    }

    #[test]
    fn new_outside_runtime_fails() {
        assert_eq!(
            SessionAuthority::new(SessionConfig::default(), None).err(),
            Some(SessionError::NoRuntime)
        );
    }

    #[test]
    fn config_from_settings() {
        let config = SessionConfig::from(SessionSettings {
            expiry_lead: Duration::from_millis(10),
            status_capacity: 4,
        });
        assert_eq!(config.expiry_lead, Duration::from_millis(10));
        assert_eq!(config.status_capacity, 4);
        assert_eq!(SessionConfig::default().expiry_lead, DEFAULT_EXPIRY_LEAD);
    }

    #[tokio::test]
    async fn debug_hides_credentials() {
        let authority = authority(Some(creds_expiring(2_000)));
        let debug = format!("{authority:?}");
        assert!(debug.contains("alarm_armed: true"));
        assert!(!debug.contains("cst"));
    }
}
