//! Best-effort event fan-out to a room's live connections.
//!
//! Delivery is at-most-once with no acknowledgement and no retry. A
//! failure enqueueing to one connection is logged and skipped; it never
//! aborts delivery to the rest of the room and never surfaces to the
//! caller. The broken connection's own receive loop will notice the
//! transport failure and deregister itself.
//!
//! Delivery order across connections is unspecified, but for a single
//! room the hub is always invoked in the order mutations were applied
//! (callers enqueue while still inside the room's serialization domain),
//! and each connection's writer drains its queue in order.

use crate::registry::{ConnId, ConnectionRegistry};
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;

#[derive(Clone)]
pub struct BroadcastHub {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastHub {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Delivers `event` to every connection currently registered for the
    /// room, except `exclude`. Returns how many connections it was
    /// enqueued to.
    pub fn deliver(&self, room_id: &str, event: &Value, exclude: Option<ConnId>) -> usize {
        let text = event.to_string();
        let mut delivered = 0;

        for handle in self.registry.connections(room_id) {
            if Some(handle.conn_id) == exclude {
                continue;
            }
            match handle.send(Message::Text(text.clone())) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    // Writer already gone; its receive loop owns cleanup.
                    warn!(
                        "Dropping event for dead connection {} in room {}",
                        handle.conn_id, room_id
                    );
                }
            }
        }

        debug!(
            "Broadcast to room {}: {} recipient(s), excluded {:?}",
            room_id, delivered, exclude
        );
        delivered
    }
}
