//! In-memory directory of registered sessions.
//!
//! Keyed by `(role, userId)` with at most one connection per key: a new
//! registration under an existing key replaces the old entry. The old
//! transport is left open (it just stops receiving events) and its eventual
//! close must not evict the newer entry, so removal matches on connection id
//! rather than key.
//!
//! All operations take one short-lived mutex. Callers get cloned `Arc`s back
//! from [`SessionRegistry::lookup`] and write to them after the lock is
//! released.

use std::collections::HashMap;
use std::sync::Arc;

use ledgerbell_core::{ConnectionId, Role, SessionKey, UserId};
use metrics::gauge;
use parking_lot::Mutex;
use tracing::debug;

use crate::metrics::SESSIONS_REGISTERED;
use crate::websocket::connection::ClientConnection;

type RoleTable = HashMap<Option<UserId>, Arc<ClientConnection>>;

/// Live session directory. Create one per process and share it by `Arc`.
#[derive(Default)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<Role, RoleTable>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` under `key`, replacing any existing entry.
    ///
    /// Returns the superseded connection, if there was one.
    pub fn register(
        &self,
        key: SessionKey,
        connection: Arc<ClientConnection>,
    ) -> Option<Arc<ClientConnection>> {
        connection.bind_key(key);
        let (previous, total) = {
            let mut entries = self.entries.lock();
            let previous = entries
                .entry(key.role)
                .or_default()
                .insert(key.user_id, connection.clone());
            (previous, count(&entries))
        };
        gauge!(SESSIONS_REGISTERED).set(total as f64);

        match &previous {
            Some(old) if old.id != connection.id => debug!(
                key = %key,
                conn_id = %connection.id,
                superseded = %old.id,
                "session registered, superseding previous connection"
            ),
            _ => debug!(key = %key, conn_id = %connection.id, "session registered"),
        }
        previous.filter(|old| old.id != connection.id)
    }

    /// Connections registered under `role`, restricted to `user_id` when given.
    pub fn lookup(&self, role: Role, user_id: Option<UserId>) -> Vec<Arc<ClientConnection>> {
        let entries = self.entries.lock();
        let Some(table) = entries.get(&role) else {
            return Vec::new();
        };
        match user_id {
            Some(_) => table.get(&user_id).cloned().into_iter().collect(),
            None => table.values().cloned().collect(),
        }
    }

    /// Remove whichever entry holds the connection `id`.
    ///
    /// Returns the key it was registered under. A connection that was
    /// superseded is no longer in the table, so this is a no-op for it.
    pub fn remove(&self, id: &ConnectionId) -> Option<SessionKey> {
        let (removed, total) = {
            let mut entries = self.entries.lock();
            let mut removed = None;
            for (role, table) in entries.iter_mut() {
                let hit = table
                    .iter()
                    .find(|(_, conn)| &conn.id == id)
                    .map(|(user_id, _)| *user_id);
                if let Some(user_id) = hit {
                    let _ = table.remove(&user_id);
                    removed = Some(SessionKey {
                        role: *role,
                        user_id,
                    });
                    break;
                }
            }
            entries.retain(|_, table| !table.is_empty());
            (removed, count(&entries))
        };
        if let Some(key) = removed {
            gauge!(SESSIONS_REGISTERED).set(total as f64);
            debug!(key = %key, conn_id = %id, "session removed");
        }
        removed
    }

    /// Number of sessions registered under `role`.
    pub fn count_role(&self, role: Role) -> usize {
        self.entries.lock().get(&role).map_or(0, HashMap::len)
    }

    /// Total registered sessions.
    pub fn len(&self) -> usize {
        count(&self.entries.lock())
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn count(entries: &HashMap<Role, RoleTable>) -> usize {
    entries.values().map(HashMap::len).sum()
}
