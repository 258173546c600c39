//! Live-connection tracking for rooms.
//!
//! The registry is the only component allowed to attach or detach a
//! connection, and it never owns room *data*, only room identifiers and
//! connection handles. It is constructed once at process start and
//! injected into everything that fans events out.
//!
//! The room index is a [`DashMap`], so registration, deregistration and
//! listing for unrelated rooms never serialize each other; operations on
//! one room's entry are mutually exclusive.

use dashmap::DashMap;
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Process-unique connection identifier. Distinct from the client-chosen
/// `client_id`: two tabs with the same client id are two connections.
pub type ConnId = u64;

/// Handle to one live connection: identity plus the queue feeding its
/// writer task. Cloning the handle clones the queue sender, not the
/// connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: ConnId,
    pub client_id: String,
    sender: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    pub fn new(conn_id: ConnId, client_id: String, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            conn_id,
            client_id,
            sender,
        }
    }

    /// Enqueues a message for this connection's writer task. Fails only
    /// when the writer side is already gone.
    pub fn send(&self, message: Message) -> Result<(), mpsc::error::SendError<Message>> {
        self.sender.send(message)
    }
}

/// Room-scoped index of live connections.
pub struct ConnectionRegistry {
    rooms: DashMap<String, Vec<ConnectionHandle>>,
    next_conn_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Allocates a fresh process-unique connection id.
    pub fn next_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Attaches a connection to a room, creating the room's entry if it is
    /// the first one.
    pub fn register(&self, room_id: &str, handle: ConnectionHandle) {
        let mut entry = self.rooms.entry(room_id.to_string()).or_default();
        entry.push(handle);
        info!(
            "Connection attached to room {} ({} total)",
            room_id,
            entry.len()
        );
    }

    /// Detaches a connection. Removing the last connection removes the
    /// room's entry entirely so idle rooms do not linger in the index.
    /// Unknown (room, connection) pairs are a no-op: double-disconnects
    /// race and must not error.
    pub fn deregister(&self, room_id: &str, conn_id: ConnId) {
        let mut drop_room = false;
        if let Some(mut entry) = self.rooms.get_mut(room_id) {
            let before = entry.len();
            entry.retain(|h| h.conn_id != conn_id);
            if entry.len() < before {
                info!("Connection detached from room {}", room_id);
            }
            drop_room = entry.is_empty();
        }
        if drop_room {
            self.rooms.remove_if(room_id, |_, conns| conns.is_empty());
        }
    }

    /// Current connections for a room, in registration order. Empty if the
    /// room has no live connections.
    pub fn connections(&self, room_id: &str) -> Vec<ConnectionHandle> {
        self.rooms
            .get(room_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Number of rooms with at least one live connection.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(registry: &ConnectionRegistry, client_id: &str) -> ConnectionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ConnectionHandle::new(registry.next_conn_id(), client_id.to_string(), tx)
    }

    #[test]
    fn test_register_creates_room_entry() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.room_count(), 0);

        registry.register("r1", handle(&registry, "a"));
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.connections("r1").len(), 1);
    }

    #[test]
    fn test_connections_keep_registration_order() {
        let registry = ConnectionRegistry::new();
        let a = handle(&registry, "a");
        let b = handle(&registry, "b");
        let c = handle(&registry, "c");
        registry.register("r1", a.clone());
        registry.register("r1", b.clone());
        registry.register("r1", c.clone());

        let ids: Vec<ConnId> = registry
            .connections("r1")
            .iter()
            .map(|h| h.conn_id)
            .collect();
        assert_eq!(ids, vec![a.conn_id, b.conn_id, c.conn_id]);
    }

    #[test]
    fn test_deregister_last_connection_drops_room() {
        let registry = ConnectionRegistry::new();
        let a = handle(&registry, "a");
        registry.register("r1", a.clone());

        registry.deregister("r1", a.conn_id);
        assert_eq!(registry.room_count(), 0);
        assert!(registry.connections("r1").is_empty());
    }

    #[test]
    fn test_deregister_keeps_other_connections() {
        let registry = ConnectionRegistry::new();
        let a = handle(&registry, "a");
        let b = handle(&registry, "b");
        registry.register("r1", a.clone());
        registry.register("r1", b.clone());

        registry.deregister("r1", a.conn_id);
        let remaining = registry.connections("r1");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].conn_id, b.conn_id);
    }

    #[test]
    fn test_deregister_unknown_pair_is_noop() {
        let registry = ConnectionRegistry::new();
        let a = handle(&registry, "a");
        registry.register("r1", a.clone());

        // Unknown room, then unknown connection, then double-disconnect.
        registry.deregister("missing", a.conn_id);
        registry.deregister("r1", 999_999);
        assert_eq!(registry.connections("r1").len(), 1);

        registry.deregister("r1", a.conn_id);
        registry.deregister("r1", a.conn_id);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_rooms_are_independent() {
        let registry = ConnectionRegistry::new();
        let a = handle(&registry, "a");
        let b = handle(&registry, "b");
        registry.register("r1", a.clone());
        registry.register("r2", b.clone());

        registry.deregister("r1", a.conn_id);
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.connections("r2").len(), 1);
    }
}
