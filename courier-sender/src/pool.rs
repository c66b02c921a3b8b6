//! Arena of connections indexed by datacenter id.
//!
//! The read path and the write path hold the same [`SharedKeys`] handle
//! through this arena, never separate copies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use courier_mtproto::SharedKeys;

use crate::conn::Connection;

/// A logical remote endpoint id.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DcId(pub i32);

impl std::fmt::Display for DcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DC {}", self.0)
    }
}

struct Entry {
    conn: Arc<Connection>,
    shared: Arc<SharedKeys>,
}

/// Connections and their shared key state, one slot per datacenter.
#[derive(Default)]
pub struct DcArena {
    entries: Mutex<HashMap<DcId, Entry>>,
}

impl DcArena {
    /// Empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the connection for a datacenter.
    ///
    /// Replacing drops the arena's handle to the previous epoch's
    /// connection; its writer exits via its stale flag.
    pub fn insert(&self, dc_id: DcId, conn: Arc<Connection>) {
        let shared = Arc::clone(conn.shared());
        self.entries.lock().unwrap().insert(dc_id, Entry { conn, shared });
    }

    /// The current connection for a datacenter.
    pub fn get(&self, dc_id: DcId) -> Option<Arc<Connection>> {
        self.entries.lock().unwrap().get(&dc_id).map(|e| Arc::clone(&e.conn))
    }

    /// The key state for a datacenter, shared across its connection epochs.
    pub fn shared(&self, dc_id: DcId) -> Option<Arc<SharedKeys>> {
        self.entries.lock().unwrap().get(&dc_id).map(|e| Arc::clone(&e.shared))
    }

    /// Whether a datacenter has a connection installed.
    pub fn contains(&self, dc_id: DcId) -> bool {
        self.entries.lock().unwrap().contains_key(&dc_id)
    }

    /// Remove a datacenter's slot, returning its connection.
    pub fn remove(&self, dc_id: DcId) -> Option<Arc<Connection>> {
        self.entries.lock().unwrap().remove(&dc_id).map(|e| e.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SenderConfig;

    #[test]
    fn arena_shares_key_handles() {
        let arena = DcArena::new();
        let dc = DcId(2);
        let shared = Arc::new(SharedKeys::new(false, false));
        let conn = Connection::new(dc, Arc::clone(&shared), SenderConfig::default());
        arena.insert(dc, conn);

        assert!(arena.contains(dc));
        let from_arena = arena.shared(dc).unwrap();
        assert!(Arc::ptr_eq(&from_arena, &shared));

        let conn = arena.get(dc).unwrap();
        assert!(Arc::ptr_eq(conn.shared(), &shared));

        arena.remove(dc);
        assert!(!arena.contains(dc));
    }
}
