use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub Uuid);

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

/// Connecting -> Subscribed -> Closed. Closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Subscribed = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Subscribed,
            _ => ConnectionState::Closed,
        }
    }
}

/// Result of handing one frame to a connection's outbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Outbox full; the client is not keeping up
    Full,
    Closed,
}

/// Server-side handle for one client connection.
///
/// Frames are queued in a bounded outbox drained by a dedicated writer task,
/// so enqueueing never waits on the network.
pub struct Connection {
    id: ConnectionId,
    state: AtomicU8,
    outbox: Mutex<Option<mpsc::Sender<ServerMessage>>>,
    /// Latest subscribe attempt; older lookups that finish late are discarded
    subscribe_ticket: AtomicU64,
    binding: Mutex<()>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, outbox: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbox: Mutex::new(Some(outbox)),
            subscribe_ticket: AtomicU64::new(0),
            binding: Mutex::new(()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Move to `Subscribed` unless already closed.
    pub(crate) fn mark_subscribed(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == ConnectionState::Closed as u8 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                ConnectionState::Subscribed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Start a subscribe attempt. Only the newest ticket may bind.
    pub(crate) fn begin_subscribe(&self) -> u64 {
        self.subscribe_ticket.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn is_current_subscribe(&self, ticket: u64) -> bool {
        self.subscribe_ticket.load(Ordering::Acquire) == ticket
    }

    /// Serializes the ticket check with the directory update
    pub(crate) fn lock_binding(&self) -> MutexGuard<'_, ()> {
        self.binding.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark closed and release the outbox so the writer drains out.
    /// Returns false if the connection was already closed.
    pub(crate) fn close(&self) -> bool {
        let previous = self
            .state
            .swap(ConnectionState::Closed as u8, Ordering::AcqRel);
        self.lock_outbox().take();
        previous != ConnectionState::Closed as u8
    }

    /// Non-blocking enqueue
    pub fn try_enqueue(&self, message: ServerMessage) -> Enqueue {
        if self.is_closed() {
            return Enqueue::Closed;
        }
        let outbox = self.lock_outbox();
        match outbox.as_ref() {
            None => Enqueue::Closed,
            Some(tx) => match tx.try_send(message) {
                Ok(()) => Enqueue::Queued,
                Err(mpsc::error::TrySendError::Full(_)) => Enqueue::Full,
                Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
            },
        }
    }

    fn lock_outbox(&self) -> MutexGuard<'_, Option<mpsc::Sender<ServerMessage>>> {
        // Never held across an await; a poisoned lock still guards a valid Option
        self.outbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pong() -> ServerMessage {
        ServerMessage::pong(Some(1))
    }

    #[test]
    fn test_lifecycle() {
        let (tx, _rx) = mpsc::channel(4);
        let conn = Connection::new(ConnectionId::new(), tx);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.mark_subscribed());
        assert_eq!(conn.state(), ConnectionState::Subscribed);
        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.mark_subscribed());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_newer_subscribe_supersedes_older() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new(ConnectionId::new(), tx);
        let first = conn.begin_subscribe();
        let second = conn.begin_subscribe();
        assert!(!conn.is_current_subscribe(first));
        assert!(conn.is_current_subscribe(second));
    }

    #[test]
    fn test_full_outbox_reported() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new(ConnectionId::new(), tx);
        assert_eq!(conn.try_enqueue(pong()), Enqueue::Queued);
        assert_eq!(conn.try_enqueue(pong()), Enqueue::Full);
    }

    #[tokio::test]
    async fn test_close_ends_writer_stream() {
        let (tx, mut rx) = mpsc::channel(4);
        let conn = Connection::new(ConnectionId::new(), tx);
        assert_eq!(conn.try_enqueue(pong()), Enqueue::Queued);
        conn.close();
        assert_eq!(conn.try_enqueue(pong()), Enqueue::Closed);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
