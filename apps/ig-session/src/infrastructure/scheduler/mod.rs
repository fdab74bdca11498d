//! Expiration Scheduler
//!
//! Owns at most one pending one-shot alarm. Arming spawns a task on the
//! configured tokio runtime that sleeps until the deadline and then runs
//! the fire callback once, unless its cancellation token trips first.
//!
//! The scheduler never holds a reference to whatever the callback acts
//! on; it only owns the cancellation token of the pending alarm.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A single armed alarm.
#[derive(Debug)]
struct PendingAlarm {
    cancel: CancellationToken,
    fire_at: Instant,
}

/// One-shot alarm owner.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use ig_session::infrastructure::scheduler::ExpirationScheduler;
///
/// # #[tokio::main]
/// # async fn main() {
/// let (tx, rx) = tokio::sync::oneshot::channel();
/// let mut scheduler = ExpirationScheduler::new(tokio::runtime::Handle::current());
///
/// scheduler.arm(Duration::from_millis(10), move || {
///     let _ = tx.send(());
/// });
///
/// rx.await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct ExpirationScheduler {
    runtime: Handle,
    pending: Option<PendingAlarm>,
}

impl ExpirationScheduler {
    /// Create a scheduler that runs alarms on `runtime`.
    #[must_use]
    pub const fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            pending: None,
        }
    }

    /// Arm an alarm that runs `on_fire` once `after` has elapsed.
    ///
    /// Any previously armed alarm is cancelled first.
    pub fn arm<F>(&mut self, after: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();

        // Read the runtime's clock so paused test time applies.
        let fire_at = {
            let _enter = self.runtime.enter();
            Instant::now() + after
        };
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        self.runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep_until(fire_at) => {
                    if !token.is_cancelled() {
                        on_fire();
                    }
                }
            }
        });

        tracing::debug!(delay_ms = after.as_millis(), "Expiration alarm armed");
        self.pending = Some(PendingAlarm { cancel, fire_at });
    }

    /// Cancel the pending alarm, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(alarm) = self.pending.take() {
            alarm.cancel.cancel();
            tracing::debug!("Expiration alarm cancelled");
        }
    }

    /// Check if an alarm is pending.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left until the pending alarm fires.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let fire_at = self.pending.as_ref()?.fire_at;
        let _enter = self.runtime.enter();
        Some(fire_at.saturating_duration_since(Instant::now()))
    }
}

impl Drop for ExpirationScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
