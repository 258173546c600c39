//! Authoritative, versioned room state.
//!
//! One mutable state blob per room, each behind its own async mutex so
//! mutations for a room are applied strictly one at a time, in submission
//! order. The version counter is compare-and-incremented *inside* that
//! serialization domain, never as a read-then-write pair, so it can
//! neither skip nor regress. Callers that observed a version can pass it along and
//! get a `Conflict` back if the room has moved on (optimistic
//! concurrency).
//!
//! No other component mutates room state directly; the room service and
//! the gateway both route every mutation through [`VersionedStateStore::apply`].

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use shared::lifecycle::{self, LifecyclePolicy, MatchCommand};
use shared::model::{self, MatchStatus, Player, Room, Snapshot};
use shared::SyncError;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A mutation request against one room's state.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Structural: reposition a player (unit-square validated).
    MovePlayer {
        player_id: String,
        x: f64,
        y: f64,
    },
    /// Structural: rename and/or recolor a team.
    UpdateTeam {
        team_id: String,
        name: Option<String>,
        color: Option<String>,
    },
    /// Structural: append a player to a team's roster.
    AddPlayer {
        team_id: String,
        label: String,
        role: String,
        is_goalkeeper: bool,
        x: f64,
        y: f64,
    },
    /// Structural: remove a player from the roster.
    RemovePlayer { player_id: String },
    StartMatch,
    EndMatch,
    /// Mark the room soft-deleted; it disappears from resolution.
    SoftDelete,
}

impl Mutation {
    /// Structural edits are the mutation class gated by the match
    /// lifecycle; lifecycle commands and deletion are not.
    fn is_structural(&self) -> bool {
        matches!(
            self,
            Mutation::MovePlayer { .. }
                | Mutation::UpdateTeam { .. }
                | Mutation::AddPlayer { .. }
                | Mutation::RemovePlayer { .. }
        )
    }
}

/// What an accepted mutation did, for fan-out to room members.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    PlayerMoved {
        player_id: String,
        x: f64,
        y: f64,
    },
    TeamUpdated {
        team_id: String,
        name: String,
        color: String,
    },
    PlayerAdded(Player),
    PlayerRemoved {
        player_id: String,
    },
    MatchStatusChanged(MatchStatus),
    RoomDeleted,
    /// Idempotent no-op: nothing changed, version untouched.
    NoChange,
}

/// Result of an accepted `apply`.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Room version after the mutation (unchanged for `NoChange`).
    pub version: u64,
    pub event: StateEvent,
}

struct RoomEntry {
    room: Room,
    /// Append-only; entries are never mutated after capture.
    snapshots: Vec<Snapshot>,
}

/// Owns every room's mutable state plus its version counter and snapshot
/// log.
pub struct VersionedStateStore {
    rooms: DashMap<String, Arc<Mutex<RoomEntry>>>,
    /// Secondary index: slug -> room_id. Slugs are immutable once set.
    slugs: DashMap<String, String>,
    policy: LifecyclePolicy,
}

impl VersionedStateStore {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self {
            rooms: DashMap::new(),
            slugs: DashMap::new(),
            policy,
        }
    }

    /// Registers a freshly created room. Fails with `Conflict` if the id
    /// or slug is already taken. Both reservations go through the entry
    /// API, so two concurrent inserts with the same slug (or id) admit
    /// exactly one room; there is no check-then-insert window.
    pub fn insert_room(&self, room: Room) -> Result<(), SyncError> {
        match self.slugs.entry(room.slug.clone()) {
            Entry::Occupied(_) => return Err(SyncError::conflict("slug already exists")),
            Entry::Vacant(vacant) => {
                vacant.insert(room.room_id.clone());
            }
        }
        match self.rooms.entry(room.room_id.clone()) {
            Entry::Occupied(_) => {
                // Release the slug reservation taken above.
                self.slugs.remove(&room.slug);
                Err(SyncError::conflict("room id already exists"))
            }
            Entry::Vacant(vacant) => {
                info!("Room {} created (slug {})", room.room_id, room.slug);
                vacant.insert(Arc::new(Mutex::new(RoomEntry {
                    room,
                    snapshots: Vec::new(),
                })));
                Ok(())
            }
        }
    }

    /// Canonical room id for a slug, if any.
    pub fn room_id_for_slug(&self, slug: &str) -> Option<String> {
        self.slugs.get(slug).map(|id| id.clone())
    }

    /// Copy of a room's current state. Soft-deleted rooms are `NotFound`.
    pub async fn get_room(&self, room_id: &str) -> Result<Room, SyncError> {
        let room = self.get_room_unchecked(room_id).await?;
        if room.is_deleted() {
            return Err(SyncError::NotFound);
        }
        Ok(room)
    }

    /// Like [`get_room`](Self::get_room) but visible to the internal purge
    /// path: soft-deleted rooms are returned.
    pub async fn get_room_unchecked(&self, room_id: &str) -> Result<Room, SyncError> {
        let entry = self.entry(room_id)?;
        let guard = entry.lock().await;
        Ok(guard.room.clone())
    }

    /// Applies a mutation, serialized against every other mutation for the
    /// same room.
    ///
    /// `expected_version` is the version the caller last observed; when
    /// supplied and stale the mutation is rejected with `Conflict` and
    /// nothing changes. On acceptance the version advances by exactly 1
    /// (or not at all for idempotent lifecycle no-ops).
    pub async fn apply(
        &self,
        room_id: &str,
        expected_version: Option<u64>,
        mutation: Mutation,
    ) -> Result<Applied, SyncError> {
        self.apply_with(room_id, expected_version, mutation, |_| {}).await
    }

    /// [`apply`](Self::apply) variant that invokes `notify` for accepted,
    /// state-changing mutations *before* releasing the room's lock, so a
    /// caller enqueueing broadcasts observes them in version order.
    pub async fn apply_with<F>(
        &self,
        room_id: &str,
        expected_version: Option<u64>,
        mutation: Mutation,
        notify: F,
    ) -> Result<Applied, SyncError>
    where
        F: FnOnce(&Applied),
    {
        let entry = self.entry(room_id)?;
        let mut guard = entry.lock().await;

        if guard.room.is_deleted() {
            return Err(SyncError::NotFound);
        }

        if let Some(expected) = expected_version {
            if expected != guard.room.version {
                return Err(SyncError::conflict(format!(
                    "stale version: observed {expected}, current {}",
                    guard.room.version
                )));
            }
        }

        if mutation.is_structural() && !guard.room.match_status.permits_structural_edits() {
            return Err(SyncError::conflict(format!(
                "structural edits are locked while match status is {:?}",
                guard.room.match_status
            )));
        }

        let event = Self::mutate(&mut guard.room, mutation, &self.policy)?;

        let applied = if event == StateEvent::NoChange {
            Applied {
                version: guard.room.version,
                event,
            }
        } else {
            let version = bump_version(&mut guard.room)?;
            let applied = Applied { version, event };
            notify(&applied);
            applied
        };

        Ok(applied)
    }

    /// Captures an immutable snapshot of the room's full current state,
    /// tagged with the current version, and appends it to the room's
    /// snapshot log.
    pub async fn snapshot(&self, room_id: &str) -> Result<Snapshot, SyncError> {
        let entry = self.entry(room_id)?;
        let mut guard = entry.lock().await;
        if guard.room.is_deleted() {
            return Err(SyncError::NotFound);
        }

        let snapshot = Snapshot {
            snapshot_id: model::new_id(),
            room_id: guard.room.room_id.clone(),
            version: guard.room.version,
            match_status: guard.room.match_status,
            teams: guard.room.teams.clone(),
            created_at: Utc::now(),
        };
        guard.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    /// Copies of the room's snapshot log, oldest first.
    pub async fn snapshots(&self, room_id: &str) -> Result<Vec<Snapshot>, SyncError> {
        let entry = self.entry(room_id)?;
        let guard = entry.lock().await;
        Ok(guard.snapshots.clone())
    }

    fn entry(&self, room_id: &str) -> Result<Arc<Mutex<RoomEntry>>, SyncError> {
        self.rooms
            .get(room_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(SyncError::NotFound)
    }

    /// The actual state transition. Runs under the room lock; returns the
    /// broadcastable event, or `NoChange` for idempotent lifecycle
    /// repeats.
    fn mutate(
        room: &mut Room,
        mutation: Mutation,
        policy: &LifecyclePolicy,
    ) -> Result<StateEvent, SyncError> {
        match mutation {
            Mutation::MovePlayer { player_id, x, y } => {
                model::validate_position(x, y)?;
                let player = room
                    .find_player_mut(&player_id)
                    .ok_or(SyncError::NotFound)?;
                player.x = x;
                player.y = y;
                Ok(StateEvent::PlayerMoved { player_id, x, y })
            }

            Mutation::UpdateTeam {
                team_id,
                name,
                color,
            } => {
                if let Some(color) = &color {
                    model::validate_color(color)?;
                }
                let team = room.team_mut(&team_id).ok_or(SyncError::NotFound)?;
                if let Some(name) = name {
                    team.name = name;
                }
                if let Some(color) = color {
                    team.color = color;
                }
                Ok(StateEvent::TeamUpdated {
                    team_id,
                    name: team.name.clone(),
                    color: team.color.clone(),
                })
            }

            Mutation::AddPlayer {
                team_id,
                label,
                role,
                is_goalkeeper,
                x,
                y,
            } => {
                model::validate_position(x, y)?;
                let room_id = room.room_id.clone();
                let team = room.team_mut(&team_id).ok_or(SyncError::NotFound)?;
                if is_goalkeeper
                    && policy.enforce_goalkeeper_unique
                    && team.goalkeeper_count() > 0
                {
                    return Err(SyncError::validation(
                        "team already has a designated goalkeeper",
                    ));
                }
                let player = Player {
                    player_id: model::new_id(),
                    team_id,
                    room_id,
                    x,
                    y,
                    label,
                    role,
                    is_goalkeeper,
                };
                team.players.push(player.clone());
                Ok(StateEvent::PlayerAdded(player))
            }

            Mutation::RemovePlayer { player_id } => {
                let team = room
                    .teams
                    .iter_mut()
                    .find(|t| t.player(&player_id).is_some())
                    .ok_or(SyncError::NotFound)?;
                team.players.retain(|p| p.player_id != player_id);
                Ok(StateEvent::PlayerRemoved { player_id })
            }

            Mutation::StartMatch => Self::lifecycle(room, MatchCommand::Start, policy),
            Mutation::EndMatch => Self::lifecycle(room, MatchCommand::End, policy),

            Mutation::SoftDelete => {
                room.deleted_at = Some(Utc::now());
                info!("Room {} soft-deleted", room.room_id);
                Ok(StateEvent::RoomDeleted)
            }
        }
    }

    fn lifecycle(
        room: &mut Room,
        command: MatchCommand,
        policy: &LifecyclePolicy,
    ) -> Result<StateEvent, SyncError> {
        match lifecycle::advance(room.match_status, command, policy) {
            Some(next) => {
                info!(
                    "Room {} match status {:?} -> {:?}",
                    room.room_id, room.match_status, next
                );
                room.match_status = next;
                Ok(StateEvent::MatchStatusChanged(next))
            }
            None => Ok(StateEvent::NoChange),
        }
    }
}

/// Advances the version counter by exactly one. Failure to advance is the
/// fatal `StateCorruption` class, not a user error.
fn bump_version(room: &mut Room) -> Result<u64, SyncError> {
    room.version = room
        .version
        .checked_add(1)
        .ok_or_else(|| SyncError::StateCorruption("version counter overflow".to_string()))?;
    Ok(room.version)
}
