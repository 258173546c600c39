//! Domain model for the tactical board.
//!
//! Ownership is strictly tree-shaped: a room owns exactly two teams (one
//! per side), each team owns its players in insertion order, and the room
//! owns an append-only log of snapshots. Connection tracking lives in the
//! server and only ever holds room *identifiers*, never room data.

use crate::error::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Match lifecycle states. `Archived` is terminal and reserved for an
/// external retention process; no command in this core drives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Setup,
    Live,
    Expired,
    Archived,
}

impl MatchStatus {
    /// Structural edits (team name/color, player positions, roster
    /// membership) are only legal before the match starts.
    pub fn permits_structural_edits(&self) -> bool {
        matches!(self, MatchStatus::Setup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    Home,
    Away,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: String,
    pub team_id: String,
    /// Denormalized owner room, mirroring the team's room.
    pub room_id: String,
    /// Horizontal position on the pitch, in `[0, 1]`.
    pub x: f64,
    /// Vertical position on the pitch, in `[0, 1]`.
    pub y: f64,
    pub label: String,
    pub role: String,
    pub is_goalkeeper: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: String,
    pub room_id: String,
    pub name: String,
    /// `#rrggbb` color code.
    pub color: String,
    /// Fixed at creation; exactly one team per side per room.
    pub side: TeamSide,
    /// Players in insertion order.
    pub players: Vec<Player>,
}

impl Team {
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn goalkeeper_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_goalkeeper).count()
    }
}

/// One match/session's addressable state container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    /// Unique human-addressable alias, immutable once set.
    pub slug: String,
    /// Issued at creation for coach-only operations. Token checking itself
    /// is an external concern; the core only carries it.
    pub coach_token: String,
    pub match_status: MatchStatus,
    /// Monotonic counter, incremented once per accepted mutation.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    /// TTL marker for automatic expiry; enforcement is external.
    pub expires_at: DateTime<Utc>,
    /// Soft-delete marker. A room with this set is logically absent from
    /// all lookups except the internal purge path.
    pub deleted_at: Option<DateTime<Utc>>,
    pub teams: Vec<Team>,
}

impl Room {
    pub fn team(&self, team_id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.team_id == team_id)
    }

    pub fn team_mut(&mut self, team_id: &str) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.team_id == team_id)
    }

    pub fn side(&self, side: TeamSide) -> Option<&Team> {
        self.teams.iter().find(|t| t.side == side)
    }

    pub fn find_player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.teams
            .iter_mut()
            .flat_map(|t| t.players.iter_mut())
            .find(|p| p.player_id == player_id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Immutable full-state capture tagged with the version it was taken at.
/// Used for resynchronizing a client that attaches (or reattaches) to a
/// room mid-session instead of replaying every intermediate event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub room_id: String,
    pub version: u64,
    pub match_status: MatchStatus,
    pub teams: Vec<Team>,
    pub created_at: DateTime<Utc>,
}

/// Generates an entity id in the same string form the rest of the system
/// stores and transmits.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Checks a pitch position against the closed unit square. Out-of-range
/// values are a validation failure, never silently clamped.
pub fn validate_position(x: f64, y: f64) -> Result<(), SyncError> {
    if !x.is_finite() || !y.is_finite() {
        return Err(SyncError::validation("position must be finite"));
    }
    if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
        return Err(SyncError::validation(format!(
            "position ({x}, {y}) outside [0,1]x[0,1]"
        )));
    }
    Ok(())
}

/// Checks a `#rrggbb` color code.
pub fn validate_color(color: &str) -> Result<(), SyncError> {
    let hex = color
        .strip_prefix('#')
        .ok_or_else(|| SyncError::validation("color must start with '#'"))?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SyncError::validation(format!(
            "color {color:?} is not a 6-hex-digit code"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn player(id: &str, gk: bool) -> Player {
        Player {
            player_id: id.to_string(),
            team_id: "t1".to_string(),
            room_id: "r1".to_string(),
            x: 0.5,
            y: 0.5,
            label: id.to_string(),
            role: if gk { "GK" } else { "Player" }.to_string(),
            is_goalkeeper: gk,
        }
    }

    fn room_with_team() -> Room {
        let team = Team {
            team_id: "t1".to_string(),
            room_id: "r1".to_string(),
            name: "Home".to_string(),
            color: "#0055ff".to_string(),
            side: TeamSide::Home,
            players: vec![player("p1", true), player("p2", false)],
        };
        Room {
            room_id: "r1".to_string(),
            slug: "morning-session".to_string(),
            coach_token: new_id(),
            match_status: MatchStatus::Setup,
            version: 0,
            created_at: Utc::now(),
            expires_at: Utc::now(),
            deleted_at: None,
            teams: vec![team],
        }
    }

    #[test]
    fn test_structural_edit_gate_per_status() {
        assert!(MatchStatus::Setup.permits_structural_edits());
        assert!(!MatchStatus::Live.permits_structural_edits());
        assert!(!MatchStatus::Expired.permits_structural_edits());
        assert!(!MatchStatus::Archived.permits_structural_edits());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MatchStatus::Setup).unwrap(),
            "\"setup\""
        );
        assert_eq!(serde_json::to_string(&TeamSide::Away).unwrap(), "\"away\"");
    }

    #[test]
    fn test_room_lookups() {
        let mut room = room_with_team();
        assert!(room.team("t1").is_some());
        assert!(room.team("missing").is_none());
        assert!(room.side(TeamSide::Home).is_some());
        assert!(room.side(TeamSide::Away).is_none());

        let p = room.find_player_mut("p2").unwrap();
        p.x = 0.25;
        assert_eq!(room.team("t1").unwrap().player("p2").unwrap().x, 0.25);
    }

    #[test]
    fn test_goalkeeper_count() {
        let room = room_with_team();
        assert_eq!(room.team("t1").unwrap().goalkeeper_count(), 1);
    }

    #[test]
    fn test_position_bounds() {
        assert!(validate_position(0.0, 0.0).is_ok());
        assert!(validate_position(1.0, 1.0).is_ok());
        assert!(validate_position(0.42, 0.58).is_ok());
        assert!(validate_position(-0.01, 0.5).is_err());
        assert!(validate_position(0.5, 1.01).is_err());
        assert!(validate_position(f64::NAN, 0.5).is_err());
        assert!(validate_position(f64::INFINITY, 0.5).is_err());
    }

    #[test]
    fn test_color_codes() {
        assert!(validate_color("#0055ff").is_ok());
        assert!(validate_color("#FF0000").is_ok());
        assert!(validate_color("0055ff").is_err());
        assert!(validate_color("#0055f").is_err());
        assert!(validate_color("#0055fg").is_err());
        assert!(validate_color("#0055ff00").is_err());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let room = room_with_team();
        let snapshot = Snapshot {
            snapshot_id: new_id(),
            room_id: room.room_id.clone(),
            version: 7,
            match_status: room.match_status,
            teams: room.teams.clone(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
