//! Session Lifecycle Integration Tests
//!
//! Drives the authority through login, expiry, logout and teardown with
//! tokio's paused clock standing in for real time.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;

use ig_session::{
    Clock, Credentials, SessionAuthority, SessionConfig, SessionError, SessionStatus,
    SessionToken, StatusStream,
};

const LEAD_MS: i64 = 50;
#[allow(clippy::cast_sign_loss)]
const LEAD: Duration = Duration::from_millis(LEAD_MS as u64);

/// Wall clock pinned to `start()`; tokio time moves, this does not.
#[derive(Debug)]
struct FrozenClock {
    now: Mutex<DateTime<Utc>>,
}

impl FrozenClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start()),
        })
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn at(offset_ms: i64) -> DateTime<Utc> {
    start() + TimeDelta::milliseconds(offset_ms)
}

fn credentials(offset_ms: i64) -> Credentials {
    Credentials::new(
        "api-key",
        "ABC123",
        SessionToken::Certificate {
            cst: "cst".to_string(),
            security_token: "xst".to_string(),
        },
        at(offset_ms),
    )
}

fn authority() -> SessionAuthority {
    SessionAuthority::with_runtime(
        Handle::current(),
        FrozenClock::new(),
        SessionConfig::with_expiry_lead(LEAD),
        None,
    )
}

/// Let woken alarm tasks run.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

/// Everything already buffered on the stream, without waiting.
fn drain(stream: &mut StatusStream) -> Vec<SessionStatus> {
    let mut seen = Vec::new();
    while let Some(Some(status)) = stream.next().now_or_never() {
        seen.push(status);
    }
    seen
}

// =============================================================================
// End-to-end Scenario
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_login_expire_logout_teardown() {
    let authority = authority();
    let mut stream = authority.status_stream();
    assert_eq!(authority.status(), SessionStatus::LoggedOut);

    authority.set_credentials(Some(credentials(2_000))).unwrap();
    assert_eq!(authority.status(), SessionStatus::Ready { until: at(2_000) });
    assert_eq!(
        drain(&mut stream),
        vec![SessionStatus::Ready { until: at(2_000) }]
    );

    advance(1_950).await;
    assert_eq!(authority.status(), SessionStatus::Expired);
    assert_eq!(drain(&mut stream), vec![SessionStatus::Expired]);
    assert!(authority.credentials().is_some(), "stale credentials kept");

    authority.set_credentials(None).unwrap();
    assert_eq!(authority.status(), SessionStatus::LoggedOut);
    assert_eq!(drain(&mut stream), vec![SessionStatus::LoggedOut]);

    authority.teardown();
    assert_eq!(stream.next().await, None);
}

// =============================================================================
// Emission Properties
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_same_expiry_emits_nothing() {
    let authority = authority();
    authority.set_credentials(Some(credentials(10_000))).unwrap();
    let mut stream = authority.status_stream();

    for _ in 0..3 {
        authority.set_credentials(Some(credentials(10_000))).unwrap();
    }

    assert!(drain(&mut stream).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_logout_dedup() {
    let authority = authority();
    let mut stream = authority.status_stream();

    authority.set_credentials(None).unwrap();
    assert!(drain(&mut stream).is_empty());

    authority.set_credentials(Some(credentials(10_000))).unwrap();
    authority.set_credentials(None).unwrap();
    authority.set_credentials(None).unwrap();
    assert_eq!(
        drain(&mut stream),
        vec![
            SessionStatus::Ready { until: at(10_000) },
            SessionStatus::LoggedOut,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_immediate_expiry_emits_at_most_once() {
    let authority = authority();
    let mut stream = authority.status_stream();

    authority.set_credentials(Some(credentials(LEAD_MS))).unwrap();
    assert_eq!(authority.status(), SessionStatus::Expired);

    authority.set_credentials(Some(credentials(-10))).unwrap();
    authority.set_credentials(Some(credentials(0))).unwrap();
    assert_eq!(authority.status(), SessionStatus::Expired);

    assert_eq!(drain(&mut stream), vec![SessionStatus::Expired]);
}

#[tokio::test(start_paused = true)]
async fn test_alarm_fires_once_at_expiry_minus_lead() {
    let authority = authority();
    authority.set_credentials(Some(credentials(2_000))).unwrap();
    let mut stream = authority.status_stream();

    advance(1_949).await;
    assert!(authority.status().is_ready());
    assert!(drain(&mut stream).is_empty());

    advance(1).await;
    assert_eq!(authority.status(), SessionStatus::Expired);

    advance(60_000).await;
    assert_eq!(drain(&mut stream), vec![SessionStatus::Expired]);
}

#[tokio::test(start_paused = true)]
async fn test_rearm_cancels_previous_alarm() {
    let authority = authority();
    let mut stream = authority.status_stream();

    authority.set_credentials(Some(credentials(2_000))).unwrap();
    authority.set_credentials(Some(credentials(5_000))).unwrap();

    advance(1_950).await;
    assert_eq!(authority.status(), SessionStatus::Ready { until: at(5_000) });

    advance(3_000).await;
    assert_eq!(authority.status(), SessionStatus::Expired);

    advance(60_000).await;
    assert_eq!(
        drain(&mut stream),
        vec![
            SessionStatus::Ready { until: at(2_000) },
            SessionStatus::Ready { until: at(5_000) },
            SessionStatus::Expired,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_logout_cancels_alarm() {
    let authority = authority();
    authority.set_credentials(Some(credentials(2_000))).unwrap();
    authority.set_credentials(None).unwrap();
    let mut stream = authority.status_stream();

    advance(10_000).await;
    assert_eq!(authority.status(), SessionStatus::LoggedOut);
    assert!(drain(&mut stream).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_relogin_after_expiry() {
    let authority = authority();
    authority.set_credentials(Some(credentials(100))).unwrap();
    let mut stream = authority.status_stream();

    advance(50).await;
    assert_eq!(authority.status(), SessionStatus::Expired);

    // Clock has not moved, so the new expiry is still in the future.
    authority.set_credentials(Some(credentials(1_000))).unwrap();
    assert_eq!(
        drain(&mut stream),
        vec![
            SessionStatus::Expired,
            SessionStatus::Ready { until: at(1_000) },
        ]
    );
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_teardown_completes_all_streams() {
    let authority = authority();
    let mut first = authority.status_stream();
    let mut second = authority.status_stream();

    authority.set_credentials(Some(credentials(2_000))).unwrap();
    authority.teardown();

    for stream in [&mut first, &mut second] {
        assert_eq!(
            stream.next().await,
            Some(SessionStatus::Ready { until: at(2_000) })
        );
        assert_eq!(stream.next().await, None);
    }

    let mut late = authority.status_stream();
    assert!(late.is_terminated());
    assert_eq!(late.next().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_disarms_alarm() {
    let authority = authority();
    authority.set_credentials(Some(credentials(2_000))).unwrap();
    authority.teardown();

    advance(10_000).await;
    assert!(authority.status().is_ready());
    assert_eq!(
        authority.set_credentials(Some(credentials(3_000))),
        Err(SessionError::Closed)
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_completes_streams() {
    let authority = authority();
    authority.set_credentials(Some(credentials(2_000))).unwrap();
    let mut stream = authority.status_stream();

    drop(authority);
    assert_eq!(stream.next().await, None);
}

// =============================================================================
// Re-entrancy
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_subscriber_can_relogin_on_expiry() {
    let authority = authority();
    let mut stream = authority.status_stream();

    let renewer = {
        let authority = authority.clone();
        tokio::spawn(async move {
            while let Some(status) = stream.next().await {
                if status.is_expired() {
                    authority.set_credentials(Some(credentials(60_000))).unwrap();
                    return status;
                }
            }
            SessionStatus::LoggedOut
        })
    };

    authority.set_credentials(Some(credentials(500))).unwrap();
    advance(450).await;

    assert_eq!(renewer.await.unwrap(), SessionStatus::Expired);
    assert_eq!(authority.status(), SessionStatus::Ready { until: at(60_000) });
}
