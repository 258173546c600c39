//! Wire protocol for a room's real-time channel.
//!
//! Every frame is a JSON object carrying a `"type"` tag. Inbound frames
//! are classified into the known event kinds; anything with an
//! unrecognized tag is still a valid *relay* event, forwarded verbatim to
//! the rest of the room without server-side interpretation (cursor
//! positions, chat, and whatever clients invent next all ride this path).
//!
//! `user_left` is reserved: the server emits it on disconnect and never
//! accepts it as inbound.

use crate::error::SyncError;
use crate::model::{MatchStatus, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound event kinds after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Structural: reposition a player on the pitch.
    Move {
        player_id: String,
        x: f64,
        y: f64,
        /// Last version the client observed, for optimistic concurrency.
        /// Absent means "apply unconditionally".
        version: Option<u64>,
    },
    /// Structural: rename/recolor a team.
    UpdateTeam {
        team_id: String,
        name: Option<String>,
        color: Option<String>,
        version: Option<u64>,
    },
    /// Lifecycle command.
    StartMatch,
    /// Lifecycle command.
    EndMatch,
    /// Unrecognized but well-formed tagged object; forwarded verbatim.
    Relay(Value),
}

#[derive(Debug, Deserialize)]
struct MoveFields {
    player_id: String,
    x: f64,
    y: f64,
    version: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UpdateTeamFields {
    team_id: String,
    name: Option<String>,
    color: Option<String>,
    version: Option<u64>,
}

/// Parses and classifies one inbound text frame.
///
/// Returns the classified event together with the parsed JSON value so the
/// caller can re-broadcast the client's payload byte-for-byte (well,
/// value-for-value) rather than a re-derived one.
pub fn decode_client_event(text: &str) -> Result<(ClientEvent, Value), SyncError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| SyncError::validation(format!("malformed JSON: {e}")))?;

    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::validation("missing string \"type\" tag"))?;

    let event = match tag {
        "move" => {
            let fields: MoveFields = serde_json::from_value(value.clone())
                .map_err(|e| SyncError::validation(format!("bad move event: {e}")))?;
            ClientEvent::Move {
                player_id: fields.player_id,
                x: fields.x,
                y: fields.y,
                version: fields.version,
            }
        }
        "update_team" => {
            let fields: UpdateTeamFields = serde_json::from_value(value.clone())
                .map_err(|e| SyncError::validation(format!("bad update_team event: {e}")))?;
            ClientEvent::UpdateTeam {
                team_id: fields.team_id,
                name: fields.name,
                color: fields.color,
                version: fields.version,
            }
        }
        "start_match" => ClientEvent::StartMatch,
        "end_match" => ClientEvent::EndMatch,
        "user_left" => {
            return Err(SyncError::validation(
                "\"user_left\" is server-emitted and not accepted inbound",
            ))
        }
        _ => ClientEvent::Relay(value.clone()),
    };

    Ok((event, value))
}

/// Server-emitted events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full-state resynchronization sent to a freshly attached connection.
    Sync { snapshot: Snapshot },
    /// Presence: a member's connection closed.
    UserLeft { client_id: String },
    /// Authoritative lifecycle/version notification for out-of-band
    /// mutations (room service calls that did not originate on a
    /// connection).
    RoomUpdated {
        match_status: MatchStatus,
        version: u64,
    },
    /// The room was soft-deleted; members should detach.
    RoomDeleted { version: u64 },
    /// Local failure report, delivered only to the offending connection.
    Error { code: String, detail: String },
}

impl ServerEvent {
    pub fn error(err: &SyncError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            detail: err.to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        // Serialization of these variants cannot fail: no non-string keys,
        // no fallible serializers.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
