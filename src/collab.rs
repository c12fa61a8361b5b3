use async_trait::async_trait;
use dashmap::DashMap;

use crate::engine::BookingError;
use crate::model::{Identity, PracticeRoom, RoomId};

/// Resolves a session token to the caller's identity and role.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_identity(&self, token: &str) -> Result<Identity, BookingError>;
}

/// Read access to the room catalog.
#[async_trait]
pub trait RoomCatalog: Send + Sync {
    async fn list_active_rooms(&self) -> Result<Vec<PracticeRoom>, BookingError>;
}

/// Token table held in memory.
#[derive(Default)]
pub struct StaticIdentities {
    tokens: DashMap<String, Identity>,
}

impl StaticIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentities {
    async fn resolve_identity(&self, token: &str) -> Result<Identity, BookingError> {
        self.tokens
            .get(token)
            .map(|e| e.value().clone())
            .ok_or(BookingError::Forbidden("unknown session token"))
    }
}

/// Room catalog held in memory.
#[derive(Default)]
pub struct StaticRoomCatalog {
    rooms: DashMap<RoomId, PracticeRoom>,
}

impl StaticRoomCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, room: PracticeRoom) {
        self.rooms.insert(room.id, room);
    }

    /// Returns false if the room is unknown.
    pub fn set_active(&self, id: RoomId, active: bool) -> bool {
        match self.rooms.get_mut(&id) {
            Some(mut room) => {
                room.active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RoomCatalog for StaticRoomCatalog {
    async fn list_active_rooms(&self) -> Result<Vec<PracticeRoom>, BookingError> {
        let mut rooms: Vec<PracticeRoom> = self
            .rooms
            .iter()
            .filter(|e| e.value().active)
            .map(|e| e.value().clone())
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rooms)
    }
}
