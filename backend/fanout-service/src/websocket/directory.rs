/// Connection directory
///
/// Maps identities to the live connections bound to them. Backed by sharded
/// `DashMap`s so subscribe, unsubscribe and the dispatch-side lookups never
/// serialize on one global lock. A guard on one map is never held while
/// touching another.
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::connection::{Connection, ConnectionId};

#[derive(Default)]
pub struct ConnectionDirectory {
    /// Every open connection, bound or not
    open: DashMap<ConnectionId, Arc<Connection>>,
    bindings: DashMap<ConnectionId, Uuid>,
    by_user: DashMap<Uuid, HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, conn: Arc<Connection>) {
        self.open.insert(conn.id(), conn);
    }

    /// Bind `conn` to `user_id`, replacing any previous binding.
    ///
    /// Returns false if the connection closed first; a closed connection is
    /// never left reachable.
    pub fn subscribe(&self, conn: &Arc<Connection>, user_id: Uuid) -> bool {
        if conn.is_closed() {
            return false;
        }
        let id = conn.id();

        if let Some(previous) = self.bindings.insert(id, user_id) {
            if previous != user_id {
                self.remove_from_user(previous, id);
            }
        }
        self.by_user
            .entry(user_id)
            .or_default()
            .insert(id, Arc::clone(conn));

        if conn.mark_subscribed() {
            return true;
        }

        // Lost a race with unsubscribe
        self.bindings.remove(&id);
        self.remove_from_user(user_id, id);
        false
    }

    /// Close `conn` and drop every trace of it. Idempotent.
    ///
    /// Returns the identity it was bound to, if any.
    pub fn unsubscribe(&self, conn: &Connection) -> Option<Uuid> {
        conn.close();
        let id = conn.id();
        self.open.remove(&id);
        let (_, user_id) = self.bindings.remove(&id)?;
        self.remove_from_user(user_id, id);
        Some(user_id)
    }

    fn remove_from_user(&self, user_id: Uuid, id: ConnectionId) {
        if let Some(mut conns) = self.by_user.get_mut(&user_id) {
            conns.remove(&id);
        }
        self.by_user.remove_if(&user_id, |_, conns| conns.is_empty());
    }

    /// Snapshot of connections bound to `user_id`
    pub fn connections_for(&self, user_id: Uuid) -> Vec<Arc<Connection>> {
        self.by_user
            .get(&user_id)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn binding_of(&self, id: ConnectionId) -> Option<Uuid> {
        self.bindings.get(&id).map(|entry| *entry)
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.by_user.get(&user_id).map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.connection_count(user_id) > 0
    }

    /// Open connections, including ones not yet subscribed
    pub fn open_connections(&self) -> usize {
        self.open.len()
    }

    pub fn subscribed_connections(&self) -> usize {
        self.bindings.len()
    }

    pub fn connected_users(&self) -> usize {
        self.by_user.len()
    }

    /// Close and remove every connection. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let conns: Vec<Arc<Connection>> = self.open.iter().map(|e| Arc::clone(e.value())).collect();
        let count = conns.len();
        for conn in conns {
            self.unsubscribe(&conn);
        }
        count
    }
}
