use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::session::UserIdentity;

/// Identifies one live connection for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of offering a frame to a connection's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Enqueued,
    Full,
    Closed,
}

/// The producer side of one connection: its identity, its bounded outbound
/// queue and its close signal. Anyone holding a handle can offer frames
/// without ever blocking.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user: UserIdentity,
    outbound: mpsc::Sender<String>,
    closed: watch::Sender<bool>,
}

impl ConnectionHandle {
    /// Creates a handle with a queue of `capacity` frames and the matching consumer side
    pub fn new(user: UserIdentity, capacity: usize) -> (Arc<Self>, OutboundQueue) {
        let (outbound, receiver) = mpsc::channel(capacity);
        let (closed, closed_signal) = watch::channel(false);

        let handle = Arc::new(Self {
            id: ConnectionId::new(),
            user,
            outbound,
            closed,
        });
        let queue = OutboundQueue {
            receiver,
            closed: closed_signal,
        };
        (handle, queue)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    /// Offers a frame without waiting for room in the queue
    pub fn try_enqueue(&self, payload: String) -> EnqueueResult {
        if self.is_closed() {
            return EnqueueResult::Closed;
        }
        match self.outbound.try_send(payload) {
            Ok(()) => EnqueueResult::Enqueued,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueResult::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueResult::Closed,
        }
    }

    /// Signals both loops of the connection to stop. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

/// Consumer side of a connection's outbound queue, owned by its write loop
pub struct OutboundQueue {
    pub(crate) receiver: mpsc::Receiver<String>,
    pub(crate) closed: watch::Receiver<bool>,
}

impl OutboundQueue {
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Takes the next queued frame if one is ready
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }

    /// Takes every frame queued so far
    pub fn drain(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Resolves once `signal` reports the connection closed, or its sender is gone
pub(crate) async fn wait_closed(signal: &mut watch::Receiver<bool>) {
    loop {
        let closed = *signal.borrow_and_update();
        if closed {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn handle(capacity: usize) -> (Arc<ConnectionHandle>, OutboundQueue) {
        ConnectionHandle::new(UserIdentity::new(1, "alice"), capacity)
    }

    #[test]
    fn test_enqueue_until_full() {
        let (handle, mut queue) = handle(2);

        assert_eq!(handle.try_enqueue("a".to_string()), EnqueueResult::Enqueued);
        assert_eq!(handle.try_enqueue("b".to_string()), EnqueueResult::Enqueued);
        assert_eq!(handle.try_enqueue("c".to_string()), EnqueueResult::Full);

        assert_eq!(queue.drain(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_enqueue_after_close_reports_closed() {
        let (handle, queue) = handle(2);

        assert!(handle.close());
        assert!(!handle.close(), "second close is a no-op");
        assert!(queue.is_closed());
        assert_eq!(handle.try_enqueue("a".to_string()), EnqueueResult::Closed);
    }

    #[test]
    fn test_enqueue_after_consumer_dropped_reports_closed() {
        let (handle, queue) = handle(2);
        drop(queue);

        assert_eq!(handle.try_enqueue("a".to_string()), EnqueueResult::Closed);
    }

    #[tokio::test]
    async fn test_wait_closed_sees_earlier_close() {
        let (handle, _queue) = handle(1);
        let mut signal = handle.closed_signal();
        handle.close();

        tokio::time::timeout(Duration::from_secs(1), wait_closed(&mut signal))
            .await
            .expect("close signalled before waiting must still resolve");
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let (first, _) = handle(1);
        let (second, _) = handle(1);
        assert_ne!(first.id(), second.id());
    }
}
