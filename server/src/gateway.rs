//! WebSocket session boundary.
//!
//! Each connection moves through Connecting (handshake + room
//! resolution), Open (registered, receive loop running) and Closed
//! (deregistered, presence broadcast). A connection target is
//! `/ws/{room}/{client_id}` where `room` is an id or slug.
//!
//! Inbound frames are decoded into tagged events. Structural edits are
//! validated and applied through the store before the client's payload is
//! re-broadcast verbatim to the rest of the room; presentation events
//! (cursor, chat, anything unrecognized) are relayed without touching
//! state. Decode and validation failures are reported back to the
//! offending connection only; they close neither the connection nor the
//! room.

use crate::hub::BroadcastHub;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::resolver::{RoomIdentity, RoomResolver};
use crate::store::{Mutation, VersionedStateStore};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::Value;
use shared::protocol::{decode_client_event, ClientEvent, ServerEvent};
use shared::SyncError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::{self, Message};

pub struct SessionGateway {
    registry: Arc<ConnectionRegistry>,
    hub: BroadcastHub,
    store: Arc<VersionedStateStore>,
    resolver: RoomResolver,
}

impl SessionGateway {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        hub: BroadcastHub,
        store: Arc<VersionedStateStore>,
    ) -> Self {
        let resolver = RoomResolver::new(Arc::clone(&store));
        Self {
            registry,
            hub,
            store,
            resolver,
        }
    }

    /// Accept loop. Each accepted socket gets its own task; a failed
    /// handshake or session error never takes the listener down.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("Gateway listening on {}", addr);
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let gateway = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = gateway.handle_connection(stream, peer).await {
                            debug!("Session from {} ended: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept failed: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), tungstenite::Error> {
        // Connecting: capture the request path during the handshake, then
        // resolve the room before admitting the session.
        let mut request_path = String::new();
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            request_path = req.uri().path().to_string();
            Ok(resp)
        })
        .await?;

        let (room_param, client_id) = match parse_session_path(&request_path) {
            Ok(target) => target,
            Err(err) => {
                warn!("Refusing {}: bad session path {:?}", peer, request_path);
                let _ = ws
                    .send(Message::Text(ServerEvent::error(&err).to_value().to_string()))
                    .await;
                let _ = ws.close(None).await;
                return Ok(());
            }
        };

        let identity = match self.resolver.resolve(&room_param).await {
            Ok(identity) => identity,
            Err(err) => {
                info!("Refusing {}: room {:?} did not resolve", peer, room_param);
                let _ = ws
                    .send(Message::Text(ServerEvent::error(&err).to_value().to_string()))
                    .await;
                let _ = ws.close(None).await;
                return Ok(());
            }
        };

        // Open: hand the write half to a dedicated task fed by a queue so
        // broadcasts never block the receive loop, then register.
        let (mut sink, mut frames) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let conn_id = self.registry.next_conn_id();
        let handle = ConnectionHandle::new(conn_id, client_id.clone(), tx);
        self.registry.register(&identity.room_id, handle.clone());
        info!(
            "Client {} ({}) joined room {} as connection {}",
            client_id, peer, identity.room_id, conn_id
        );

        // Resynchronize the newcomer with a versioned snapshot instead of
        // making it replay history.
        match self.store.snapshot(&identity.room_id).await {
            Ok(snapshot) => {
                let sync = ServerEvent::Sync { snapshot };
                let _ = handle.send(Message::Text(sync.to_value().to_string()));
            }
            Err(err) => report_local(&handle, &err),
        }

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    self.handle_frame(&identity, &handle, &text).await;
                }
                Ok(Message::Ping(payload)) => {
                    let _ = handle.send(Message::Pong(payload));
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {} // Binary and pong frames carry nothing for us.
                Err(e) => {
                    debug!("Transport error on connection {}: {}", conn_id, e);
                    break;
                }
            }
        }

        // Closed: detach first so the presence event cannot loop back,
        // then tell every remaining member, nobody excluded.
        self.registry.deregister(&identity.room_id, conn_id);
        let left = ServerEvent::UserLeft {
            client_id: client_id.clone(),
        };
        self.hub.deliver(&identity.room_id, &left.to_value(), None);
        info!("Client {} left room {}", client_id, identity.room_id);

        drop(handle);
        let _ = writer.await;
        Ok(())
    }

    /// Decodes, gates and applies one inbound frame. All failures are
    /// local to the sender.
    async fn handle_frame(&self, identity: &RoomIdentity, handle: &ConnectionHandle, text: &str) {
        let (event, raw) = match decode_client_event(text) {
            Ok(decoded) => decoded,
            Err(err) => {
                report_local(handle, &err);
                return;
            }
        };

        let result = match event {
            // Pure relay: no state, no version, no gating.
            ClientEvent::Relay(_) => {
                self.hub.deliver(&identity.room_id, &raw, Some(handle.conn_id));
                return;
            }
            ClientEvent::Move {
                player_id,
                x,
                y,
                version,
            } => {
                self.apply_and_fanout(
                    identity,
                    handle,
                    version,
                    Mutation::MovePlayer { player_id, x, y },
                    &raw,
                )
                .await
            }
            ClientEvent::UpdateTeam {
                team_id,
                name,
                color,
                version,
            } => {
                self.apply_and_fanout(
                    identity,
                    handle,
                    version,
                    Mutation::UpdateTeam {
                        team_id,
                        name,
                        color,
                    },
                    &raw,
                )
                .await
            }
            ClientEvent::StartMatch => {
                self.apply_and_fanout(identity, handle, None, Mutation::StartMatch, &raw)
                    .await
            }
            ClientEvent::EndMatch => {
                self.apply_and_fanout(identity, handle, None, Mutation::EndMatch, &raw)
                    .await
            }
        };

        if let Err(err) = result {
            report_local(handle, &err);
        }
    }

    /// Applies a state-bearing event and, while still inside the room's
    /// serialization domain, re-broadcasts the client's original payload
    /// to everyone else, keeping fan-out in version order.
    async fn apply_and_fanout(
        &self,
        identity: &RoomIdentity,
        handle: &ConnectionHandle,
        expected_version: Option<u64>,
        mutation: Mutation,
        raw: &Value,
    ) -> Result<(), SyncError> {
        let hub = self.hub.clone();
        let room_id = identity.room_id.clone();
        let conn_id = handle.conn_id;
        self.store
            .apply_with(&identity.room_id, expected_version, mutation, |_applied| {
                hub.deliver(&room_id, raw, Some(conn_id));
            })
            .await?;
        Ok(())
    }
}

/// Error report to the offending connection only; never broadcast.
fn report_local(handle: &ConnectionHandle, err: &SyncError) {
    warn!("Connection {}: {}", handle.conn_id, err);
    let _ = handle.send(Message::Text(ServerEvent::error(err).to_value().to_string()));
}

/// Parses `/ws/{room}/{client_id}`.
fn parse_session_path(path: &str) -> Result<(String, String), SyncError> {
    let mut parts = path.trim_matches('/').split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("ws"), Some(room), Some(client), None) if !room.is_empty() && !client.is_empty() => {
            Ok((room.to_string(), client.to_string()))
        }
        _ => Err(SyncError::validation(
            "session path must be /ws/{room}/{client_id}",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_path() {
        assert_eq!(
            parse_session_path("/ws/r1/coach").unwrap(),
            ("r1".to_string(), "coach".to_string())
        );
        assert_eq!(
            parse_session_path("/ws/morning-drills/c-42/").unwrap(),
            ("morning-drills".to_string(), "c-42".to_string())
        );
    }

    #[test]
    fn test_parse_session_path_rejects_malformed() {
        for path in ["/", "/ws", "/ws/only-room", "/ws/r1/c1/extra", "/api/r1/c1", "/ws//c1"] {
            assert!(parse_session_path(path).is_err(), "accepted {path:?}");
        }
    }
}
