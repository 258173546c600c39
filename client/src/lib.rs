//! # Board Client Library
//!
//! Minimal client for the board synchronization server: connect to a room
//! over WebSocket, send tagged events, and receive the room's event
//! stream. Used by the CLI binary and by the workspace integration tests;
//! it deliberately knows nothing about rendering or local prediction.
//! The server's state is the only state.

use futures_util::{SinkExt, StreamExt};
use log::debug;
use serde_json::{json, Value};
use shared::model::Snapshot;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One connection to one room.
pub struct BoardClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub client_id: String,
}

impl BoardClient {
    /// Connects to `ws://{server_addr}/ws/{room}/{client_id}`. `room` may
    /// be a room id or a slug.
    pub async fn connect(server_addr: &str, room: &str, client_id: &str) -> Result<Self, BoxError> {
        let url = format!("ws://{server_addr}/ws/{room}/{client_id}");
        debug!("Connecting to {}", url);
        let (ws, _response) = connect_async(&url).await?;
        Ok(Self {
            ws,
            client_id: client_id.to_string(),
        })
    }

    /// Sends one raw tagged event.
    pub async fn send_event(&mut self, event: &Value) -> Result<(), BoxError> {
        self.ws.send(Message::Text(event.to_string())).await?;
        Ok(())
    }

    /// Sends a structural move for one player.
    pub async fn send_move(&mut self, player_id: &str, x: f64, y: f64) -> Result<(), BoxError> {
        self.send_event(&json!({
            "type": "move",
            "player_id": player_id,
            "x": x,
            "y": y,
        }))
        .await
    }

    /// Sends a presentation-layer cursor event (relayed, never stored).
    pub async fn send_cursor(&mut self, x: f64, y: f64) -> Result<(), BoxError> {
        self.send_event(&json!({
            "type": "cursor",
            "client_id": self.client_id,
            "x": x,
            "y": y,
        }))
        .await
    }

    /// Next event from the room, or `None` once the server closes the
    /// connection. Transparent to pings.
    pub async fn next_event(&mut self) -> Result<Option<Value>, BoxError> {
        while let Some(frame) = self.ws.next().await {
            match frame? {
                Message::Text(text) => return Ok(Some(serde_json::from_str(&text)?)),
                Message::Ping(payload) => self.ws.send(Message::Pong(payload)).await?,
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Waits for the initial `sync` snapshot the server sends on attach
    /// and returns it.
    pub async fn await_sync(&mut self) -> Result<Value, BoxError> {
        while let Some(event) = self.next_event().await? {
            if event["type"] == "sync" {
                return Ok(event);
            }
        }
        Err("connection closed before sync event".into())
    }

    /// Like [`await_sync`](Self::await_sync), but returns the typed
    /// snapshot instead of the raw event.
    pub async fn await_snapshot(&mut self) -> Result<Snapshot, BoxError> {
        let sync = self.await_sync().await?;
        Ok(serde_json::from_value(sync["snapshot"].clone())?)
    }

    pub async fn close(mut self) -> Result<(), BoxError> {
        self.ws.close(None).await?;
        Ok(())
    }
}
