//! Status Broadcast Channel
//!
//! Multicasts session status transitions using a tokio broadcast channel
//! for fan-out to any number of subscribers.
//!
//! # Semantics
//!
//! - Subscribers receive every status emitted after they subscribe; there
//!   is no replay of earlier statuses.
//! - Streams never yield errors. A subscriber that falls behind the
//!   channel capacity skips the overwritten statuses and keeps going.
//! - Closing drops the sender: existing streams end once drained and new
//!   subscriptions end immediately.
//! - No deduplication happens here; the authority only emits real changes.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::domain::session::SessionStatus;

/// Default capacity of the status channel.
pub const DEFAULT_STATUS_CAPACITY: usize = 64;

// =============================================================================
// Status Broadcaster
// =============================================================================

/// Multicast pipe for [`SessionStatus`] values.
#[derive(Debug)]
pub struct StatusBroadcaster {
    sender: RwLock<Option<broadcast::Sender<SessionStatus>>>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_CAPACITY)
    }
}

impl StatusBroadcaster {
    /// Create a broadcaster buffering up to `capacity` unread statuses per
    /// subscriber. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: RwLock::new(Some(broadcast::channel(capacity.max(1)).0)),
        }
    }

    /// Send a status to all current subscribers.
    ///
    /// Returns the number of subscribers that will see it. Emitting with
    /// no subscribers, or after [`close`](Self::close), delivers nothing.
    pub fn emit(&self, status: SessionStatus) -> usize {
        self.sender
            .read()
            .as_ref()
            .and_then(|tx| tx.send(status).ok())
            .unwrap_or(0)
    }

    /// Subscribe to future statuses.
    #[must_use]
    pub fn subscribe(&self) -> StatusStream {
        StatusStream {
            inner: self
                .sender
                .read()
                .as_ref()
                .map(|tx| BroadcastStream::new(tx.subscribe())),
        }
    }

    /// Permanently close the channel. Idempotent.
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            tracing::debug!("Status broadcaster closed");
        }
    }

    /// Check if the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

// =============================================================================
// Status Stream
// =============================================================================

/// Stream of session statuses that only ever ends, never fails.
#[derive(Debug)]
pub struct StatusStream {
    inner: Option<BroadcastStream<SessionStatus>>,
}

impl StatusStream {
    /// Check if the stream has already completed.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl Stream for StatusStream {
    type Item = SessionStatus;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(inner.poll_next_unpin(cx)) {
                Some(Ok(status)) => return Poll::Ready(Some(status)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "Status subscriber lagged, statuses dropped");
                }
                None => {
                    this.inner = None;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    use super::*;

    fn ready_status() -> SessionStatus {
        SessionStatus::Ready {
            until: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let broadcaster = StatusBroadcaster::default();
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        assert_eq!(broadcaster.emit(ready_status()), 2);
        assert_eq!(broadcaster.emit(SessionStatus::Expired), 2);

        for stream in [&mut first, &mut second] {
            assert_eq!(stream.next().await, Some(ready_status()));
            assert_eq!(stream.next().await, Some(SessionStatus::Expired));
        }
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let broadcaster = StatusBroadcaster::default();
        let _early = broadcaster.subscribe();
        broadcaster.emit(SessionStatus::Expired);

        let mut late = task::spawn(broadcaster.subscribe());
        assert_pending!(late.poll_next());

        broadcaster.emit(SessionStatus::LoggedOut);
        assert_ready_eq!(late.poll_next(), Some(SessionStatus::LoggedOut));
    }

    #[test]
    fn emit_without_subscribers_is_harmless() {
        let broadcaster = StatusBroadcaster::default();
        assert_eq!(broadcaster.emit(SessionStatus::Expired), 0);
    }

    #[tokio::test]
    async fn close_completes_existing_streams_after_drain() {
        let broadcaster = StatusBroadcaster::default();
        let mut stream = broadcaster.subscribe();

        broadcaster.emit(SessionStatus::Expired);
        broadcaster.close();

        assert_eq!(stream.next().await, Some(SessionStatus::Expired));
        assert_eq!(stream.next().await, None);
        assert!(stream.is_terminated());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn subscribe_after_close_completes_immediately() {
        let broadcaster = StatusBroadcaster::default();
        broadcaster.close();
        broadcaster.close();

        assert!(broadcaster.is_closed());
        assert_eq!(broadcaster.emit(SessionStatus::Expired), 0);
        assert_eq!(broadcaster.subscriber_count(), 0);

        let mut stream = broadcaster.subscribe();
        assert!(stream.is_terminated());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_without_error() {
        let broadcaster = StatusBroadcaster::new(2);
        let mut stream = broadcaster.subscribe();

        broadcaster.emit(SessionStatus::LoggedOut);
        broadcaster.emit(ready_status());
        broadcaster.emit(SessionStatus::Expired);
        broadcaster.close();

        let received: Vec<_> = stream.by_ref().collect().await;
        assert_eq!(received, vec![ready_status(), SessionStatus::Expired]);
    }
}
