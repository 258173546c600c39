//! Room identifier resolution.
//!
//! Rooms are addressable by canonical id or by slug; every component goes
//! through here so the two are interchangeable. Resolution is
//! deterministic (exact id match first, then exact slug match) and has no
//! side effects. Soft-deleted rooms resolve to `NotFound` for everyone
//! except the internal purge path.

use crate::store::VersionedStateStore;
use shared::SyncError;
use std::sync::Arc;

/// Canonical identity of a resolved room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomIdentity {
    pub room_id: String,
    pub slug: String,
}

pub struct RoomResolver {
    store: Arc<VersionedStateStore>,
}

impl RoomResolver {
    pub fn new(store: Arc<VersionedStateStore>) -> Self {
        Self { store }
    }

    /// Resolves an opaque identifier (room id or slug) to the room's
    /// canonical identity.
    pub async fn resolve(&self, identifier: &str) -> Result<RoomIdentity, SyncError> {
        self.lookup(identifier, false).await
    }

    /// Purge-path resolution: soft-deleted rooms are still visible.
    pub async fn resolve_for_purge(&self, identifier: &str) -> Result<RoomIdentity, SyncError> {
        self.lookup(identifier, true).await
    }

    async fn lookup(
        &self,
        identifier: &str,
        include_deleted: bool,
    ) -> Result<RoomIdentity, SyncError> {
        // Exact id match first, then slug.
        let room = match self.store.get_room_unchecked(identifier).await {
            Ok(room) => room,
            Err(SyncError::NotFound) => {
                let room_id = self
                    .store
                    .room_id_for_slug(identifier)
                    .ok_or(SyncError::NotFound)?;
                self.store.get_room_unchecked(&room_id).await?
            }
            Err(other) => return Err(other),
        };

        if room.is_deleted() && !include_deleted {
            return Err(SyncError::NotFound);
        }

        Ok(RoomIdentity {
            room_id: room.room_id,
            slug: room.slug,
        })
    }
}
