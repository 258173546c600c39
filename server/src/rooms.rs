//! Room service: the mutation/query surface the external CRUD layer sits
//! on top of.
//!
//! Every operation that touches structural state routes through
//! [`VersionedStateStore::apply`] and fans the resulting event out through
//! the hub, so the version counter and the broadcast stream can never
//! disagree no matter whether a change came in over a connection or
//! through this surface. The HTTP shape of these operations is someone
//! else's problem.

use crate::hub::BroadcastHub;
use crate::resolver::RoomResolver;
use crate::store::{Applied, Mutation, StateEvent, VersionedStateStore};
use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::{json, Value};
use shared::model::{self, MatchStatus, Player, Room, Snapshot, Team, TeamSide};
use shared::protocol::ServerEvent;
use shared::SyncError;
use std::sync::Arc;

/// Room creation defaults.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Lifetime stamped into `expires_at`; expiry enforcement is external.
    pub ttl: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(48),
        }
    }
}

pub struct RoomService {
    store: Arc<VersionedStateStore>,
    resolver: RoomResolver,
    hub: BroadcastHub,
    config: RoomConfig,
}

impl RoomService {
    pub fn new(
        store: Arc<VersionedStateStore>,
        hub: BroadcastHub,
        config: RoomConfig,
    ) -> Self {
        let resolver = RoomResolver::new(Arc::clone(&store));
        Self {
            store,
            resolver,
            hub,
            config,
        }
    }

    /// Creates a room pre-populated with a home and an away team of eleven
    /// players each. A requested slug that is already taken is a
    /// `Conflict`; without one a random slug is allocated.
    pub async fn create_room(&self, custom_slug: Option<String>) -> Result<Room, SyncError> {
        if let Some(slug) = custom_slug {
            let room = starter_room(slug, self.config.ttl);
            self.store.insert_room(room.clone())?;
            return Ok(room);
        }

        // Generated slugs can collide; the store's insert is the sole
        // uniqueness authority, so collide-and-retry instead of
        // check-then-insert.
        for _ in 0..4 {
            let room = starter_room(generate_slug(), self.config.ttl);
            match self.store.insert_room(room.clone()) {
                Ok(()) => return Ok(room),
                Err(SyncError::Conflict(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(SyncError::conflict("could not allocate a unique slug"))
    }

    /// Reads a room by id or slug.
    pub async fn get_room(&self, identifier: &str) -> Result<Room, SyncError> {
        let identity = self.resolver.resolve(identifier).await?;
        self.store.get_room(&identity.room_id).await
    }

    pub async fn list_teams(&self, identifier: &str) -> Result<Vec<Team>, SyncError> {
        Ok(self.get_room(identifier).await?.teams)
    }

    /// Renames and/or recolors a team. Locked once the match has started.
    pub async fn update_team(
        &self,
        identifier: &str,
        team_id: &str,
        name: Option<String>,
        color: Option<String>,
        expected_version: Option<u64>,
    ) -> Result<Applied, SyncError> {
        self.apply_and_broadcast(
            identifier,
            expected_version,
            Mutation::UpdateTeam {
                team_id: team_id.to_string(),
                name,
                color,
            },
        )
        .await
    }

    pub async fn add_player(
        &self,
        identifier: &str,
        team_id: &str,
        label: String,
        role: String,
        is_goalkeeper: bool,
        x: f64,
        y: f64,
        expected_version: Option<u64>,
    ) -> Result<Applied, SyncError> {
        self.apply_and_broadcast(
            identifier,
            expected_version,
            Mutation::AddPlayer {
                team_id: team_id.to_string(),
                label,
                role,
                is_goalkeeper,
                x,
                y,
            },
        )
        .await
    }

    pub async fn remove_player(
        &self,
        identifier: &str,
        player_id: &str,
        expected_version: Option<u64>,
    ) -> Result<Applied, SyncError> {
        self.apply_and_broadcast(
            identifier,
            expected_version,
            Mutation::RemovePlayer {
                player_id: player_id.to_string(),
            },
        )
        .await
    }

    /// Starts the match. Idempotent: already-live rooms report `Live`
    /// again without a version bump.
    pub async fn start_match(&self, identifier: &str) -> Result<MatchStatus, SyncError> {
        self.lifecycle(identifier, Mutation::StartMatch).await
    }

    /// Ends the match.
    pub async fn end_match(&self, identifier: &str) -> Result<MatchStatus, SyncError> {
        self.lifecycle(identifier, Mutation::EndMatch).await
    }

    /// Soft-deletes a room: it vanishes from resolution, connected members
    /// are told to detach. Purging the data afterwards is external.
    pub async fn delete_room(&self, identifier: &str) -> Result<(), SyncError> {
        self.apply_and_broadcast(identifier, None, Mutation::SoftDelete)
            .await?;
        Ok(())
    }

    /// Captures a reconciliation snapshot of the room's current state.
    pub async fn snapshot(&self, identifier: &str) -> Result<Snapshot, SyncError> {
        let identity = self.resolver.resolve(identifier).await?;
        self.store.snapshot(&identity.room_id).await
    }

    async fn lifecycle(
        &self,
        identifier: &str,
        mutation: Mutation,
    ) -> Result<MatchStatus, SyncError> {
        let identity = self.resolver.resolve(identifier).await?;
        let applied = self
            .apply_to_room(&identity.room_id, None, mutation)
            .await?;
        match applied.event {
            StateEvent::MatchStatusChanged(status) => Ok(status),
            // Idempotent repeat: report the unchanged current status.
            _ => Ok(self.store.get_room(&identity.room_id).await?.match_status),
        }
    }

    async fn apply_and_broadcast(
        &self,
        identifier: &str,
        expected_version: Option<u64>,
        mutation: Mutation,
    ) -> Result<Applied, SyncError> {
        let identity = self.resolver.resolve(identifier).await?;
        self.apply_to_room(&identity.room_id, expected_version, mutation)
            .await
    }

    async fn apply_to_room(
        &self,
        room_id: &str,
        expected_version: Option<u64>,
        mutation: Mutation,
    ) -> Result<Applied, SyncError> {
        let hub = self.hub.clone();
        self.store
            .apply_with(room_id, expected_version, mutation, |applied| {
                if let Some(event) = wire_event(applied) {
                    hub.deliver(room_id, &event, None);
                }
            })
            .await
    }
}

/// Wire form of a service-originated state change. `NoChange` produces
/// nothing to broadcast.
fn wire_event(applied: &Applied) -> Option<Value> {
    match &applied.event {
        StateEvent::TeamUpdated {
            team_id,
            name,
            color,
        } => Some(json!({
            "type": "update_team",
            "team_id": team_id,
            "name": name,
            "color": color,
            "version": applied.version,
        })),
        StateEvent::PlayerMoved { player_id, x, y } => Some(json!({
            "type": "move",
            "player_id": player_id,
            "x": x,
            "y": y,
            "version": applied.version,
        })),
        StateEvent::PlayerAdded(player) => Some(json!({
            "type": "player_added",
            "player": player,
            "version": applied.version,
        })),
        StateEvent::PlayerRemoved { player_id } => Some(json!({
            "type": "player_removed",
            "player_id": player_id,
            "version": applied.version,
        })),
        StateEvent::MatchStatusChanged(status) => Some(
            ServerEvent::RoomUpdated {
                match_status: *status,
                version: applied.version,
            }
            .to_value(),
        ),
        StateEvent::RoomDeleted => Some(
            ServerEvent::RoomDeleted {
                version: applied.version,
            }
            .to_value(),
        ),
        StateEvent::NoChange => None,
    }
}

/// Builds a fresh room with the default board: home in blue, away in red,
/// eleven players each with the goalkeeper on their own goal line and the
/// outfield on a simple grid formation, mirrored for the away side.
pub fn starter_room(slug: String, ttl: Duration) -> Room {
    let room_id = model::new_id();
    let created_at = Utc::now();

    let home = starter_team(&room_id, TeamSide::Home, "Home", "#0055ff");
    let away = starter_team(&room_id, TeamSide::Away, "Away", "#ff0000");

    Room {
        room_id,
        slug,
        coach_token: model::new_id(),
        match_status: MatchStatus::Setup,
        version: 0,
        created_at,
        expires_at: created_at + ttl,
        deleted_at: None,
        teams: vec![home, away],
    }
}

fn starter_team(room_id: &str, side: TeamSide, name: &str, color: &str) -> Team {
    let team_id = model::new_id();
    let players = (0..11)
        .map(|i| {
            let is_goalkeeper = i == 0;
            let (x, y) = starter_position(side, i, is_goalkeeper);
            Player {
                player_id: model::new_id(),
                team_id: team_id.clone(),
                room_id: room_id.to_string(),
                x,
                y,
                label: (i + 1).to_string(),
                role: if is_goalkeeper { "GK" } else { "Player" }.to_string(),
                is_goalkeeper,
            }
        })
        .collect();

    Team {
        team_id,
        room_id: room_id.to_string(),
        name: name.to_string(),
        color: color.to_string(),
        side,
        players,
    }
}

fn starter_position(side: TeamSide, index: usize, is_goalkeeper: bool) -> (f64, f64) {
    if is_goalkeeper {
        return match side {
            TeamSide::Home => (0.1, 0.5),
            TeamSide::Away => (0.9, 0.5),
        };
    }
    let column = (index / 4) as f64 * 0.15;
    let row = 0.1 + (index % 4) as f64 * 0.25;
    match side {
        TeamSide::Home => (0.3 + column, row),
        TeamSide::Away => (0.7 - column, row),
    }
}

fn generate_slug() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectionHandle, ConnectionRegistry};
    use assert_approx_eq::assert_approx_eq;
    use shared::lifecycle::LifecyclePolicy;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    fn service() -> (RoomService, Arc<ConnectionRegistry>) {
        let store = Arc::new(VersionedStateStore::new(LifecyclePolicy::default()));
        let registry = Arc::new(ConnectionRegistry::new());
        let hub = BroadcastHub::new(Arc::clone(&registry));
        (
            RoomService::new(store, hub, RoomConfig::default()),
            registry,
        )
    }

    #[test]
    fn test_starter_room_shape() {
        let room = starter_room("scrimmage".to_string(), Duration::hours(48));

        assert_eq!(room.version, 0);
        assert_eq!(room.match_status, MatchStatus::Setup);
        assert_eq!(room.teams.len(), 2);
        assert!(room.expires_at > room.created_at);

        let home = room.side(TeamSide::Home).unwrap();
        let away = room.side(TeamSide::Away).unwrap();
        assert_eq!(home.color, "#0055ff");
        assert_eq!(away.color, "#ff0000");

        for team in &room.teams {
            assert_eq!(team.players.len(), 11);
            assert_eq!(team.goalkeeper_count(), 1);
            for player in &team.players {
                assert!(model::validate_position(player.x, player.y).is_ok());
                assert_eq!(player.room_id, room.room_id);
                assert_eq!(player.team_id, team.team_id);
            }
        }

        let home_gk = home.players.iter().find(|p| p.is_goalkeeper).unwrap();
        let away_gk = away.players.iter().find(|p| p.is_goalkeeper).unwrap();
        assert_approx_eq!(home_gk.x, 0.1);
        assert_approx_eq!(away_gk.x, 0.9);
        assert_approx_eq!(home_gk.y, 0.5);
    }

    #[tokio::test]
    async fn test_create_room_custom_slug_conflict() {
        let (service, _) = service();
        service
            .create_room(Some("tuesday".to_string()))
            .await
            .unwrap();
        let err = service
            .create_room(Some("tuesday".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn test_create_room_generates_slug() {
        let (service, _) = service();
        let room = service.create_room(None).await.unwrap();
        assert_eq!(room.slug.len(), 8);
        assert_eq!(
            service.get_room(&room.slug).await.unwrap().room_id,
            room.room_id
        );
    }

    #[tokio::test]
    async fn test_update_team_broadcasts_to_room() {
        let (service, registry) = service();
        let room = service.create_room(None).await.unwrap();
        let team_id = room.side(TeamSide::Home).unwrap().team_id.clone();

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(
            &room.room_id,
            ConnectionHandle::new(registry.next_conn_id(), "viewer".to_string(), tx),
        );

        let applied = service
            .update_team(
                &room.slug,
                &team_id,
                Some("Reds".to_string()),
                Some("#cc0000".to_string()),
                Some(0),
            )
            .await
            .unwrap();
        assert_eq!(applied.version, 1);

        let Message::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let event: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(event["type"], "update_team");
        assert_eq!(event["name"], "Reds");
        assert_eq!(event["version"], 1);
    }

    #[tokio::test]
    async fn test_match_lifecycle_via_service() {
        let (service, _) = service();
        let room = service.create_room(None).await.unwrap();

        assert_eq!(
            service.start_match(&room.slug).await.unwrap(),
            MatchStatus::Live
        );
        // Second start: same answer, no error, no version movement.
        assert_eq!(
            service.start_match(&room.slug).await.unwrap(),
            MatchStatus::Live
        );
        assert_eq!(service.get_room(&room.slug).await.unwrap().version, 1);

        assert_eq!(
            service.end_match(&room.slug).await.unwrap(),
            MatchStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_team_edit_locked_after_start() {
        let (service, _) = service();
        let room = service.create_room(None).await.unwrap();
        let team_id = room.side(TeamSide::Away).unwrap().team_id.clone();

        service.start_match(&room.room_id).await.unwrap();
        let err = service
            .update_team(&room.room_id, &team_id, None, Some("#123abc".to_string()), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        let unchanged = service.get_room(&room.room_id).await.unwrap();
        assert_eq!(unchanged.side(TeamSide::Away).unwrap().color, "#ff0000");
    }

    #[tokio::test]
    async fn test_delete_room_hides_it_and_notifies() {
        let (service, registry) = service();
        let room = service.create_room(None).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(
            &room.room_id,
            ConnectionHandle::new(registry.next_conn_id(), "viewer".to_string(), tx),
        );

        service.delete_room(&room.slug).await.unwrap();
        assert_eq!(
            service.get_room(&room.slug).await.unwrap_err(),
            SyncError::NotFound
        );

        let Message::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let event: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(event["type"], "room_deleted");
    }

    #[tokio::test]
    async fn test_snapshot_through_service() {
        let (service, _) = service();
        let room = service.create_room(None).await.unwrap();
        let snapshot = service.snapshot(&room.slug).await.unwrap();
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.room_id, room.room_id);
        assert_eq!(snapshot.teams.len(), 2);
    }
}
