use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RoomState, SharedRoomState, Store, StoreError};
use crate::model::*;
use crate::ports::{RoomDirectory, UserDirectory};

// ── Rooms ────────────────────────────────────────────────────────

impl Store {
    pub async fn create_room(&self, fields: NewRoom) -> Result<Room, StoreError> {
        let _gate = self.gate.read().await;
        let room = Room {
            id: self.sequences.next_room(),
            code: fields.code,
            name: fields.name,
            location: fields.location,
            capacity: fields.capacity,
        };
        self.wal_append(&Event::RoomCreated(room.clone())).await?;
        self.rooms
            .insert(room.id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
        Ok(room)
    }

    pub async fn room(&self, id: Id) -> Option<Room> {
        let state = self.room_state(id)?;
        let guard = state.read().await;
        Some(guard.room.clone())
    }

    pub async fn list_rooms(&self) -> Vec<Room> {
        let mut states: Vec<(Id, SharedRoomState)> = self
            .rooms
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        states.sort_by_key(|(id, _)| *id);
        let mut rooms = Vec::with_capacity(states.len());
        for (_, state) in states {
            rooms.push(state.read().await.room.clone());
        }
        rooms
    }

    pub async fn update_room(&self, id: Id, patch: &RoomPatch) -> Result<Option<Room>, StoreError> {
        let _gate = self.gate.read().await;
        let Some(state) = self.room_state(id) else {
            return Ok(None);
        };
        let mut guard = state.write().await;
        let room = guard.room.patched(patch);
        self.wal_append(&Event::RoomUpdated(room.clone())).await?;
        guard.room = room.clone();
        Ok(Some(room))
    }

    /// Fails with `Referenced` while any reservation still books the room.
    pub async fn delete_room(&self, id: Id) -> Result<bool, StoreError> {
        let _gate = self.gate.write().await;
        let Some(state) = self.room_state(id) else {
            return Ok(false);
        };
        if !state.read().await.slots.is_empty() {
            return Err(StoreError::Referenced(Entity::Room, id));
        }
        self.wal_append(&Event::RoomDeleted { id }).await?;
        self.rooms.remove(&id);
        Ok(true)
    }
}

// ── Users ────────────────────────────────────────────────────────

impl Store {
    pub async fn create_user(&self, fields: NewUser) -> Result<User, StoreError> {
        let _gate = self.gate.read().await;
        let user = User {
            id: self.sequences.next_user(),
            name: fields.name,
            email: fields.email,
        };
        self.wal_append(&Event::UserCreated(user.clone())).await?;
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn user(&self, id: Id) -> Option<User> {
        self.users.get(&id).map(|e| e.value().clone())
    }

    pub fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    pub async fn update_user(&self, id: Id, patch: &UserPatch) -> Result<Option<User>, StoreError> {
        let _gate = self.gate.read().await;
        let _writes = self.user_writes.lock().await;
        let Some(current) = self.user(id) else {
            return Ok(None);
        };
        let user = current.patched(patch);
        self.wal_append(&Event::UserUpdated(user.clone())).await?;
        self.users.insert(id, user.clone());
        Ok(Some(user))
    }

    /// Fails with `Referenced` while the user is responsible for any reservation.
    pub async fn delete_user(&self, id: Id) -> Result<bool, StoreError> {
        let _gate = self.gate.write().await;
        if !self.users.contains_key(&id) {
            return Ok(false);
        }
        if self
            .reservations
            .iter()
            .any(|e| e.value().responsible_id == id)
        {
            return Err(StoreError::Referenced(Entity::User, id));
        }
        self.wal_append(&Event::UserDeleted { id }).await?;
        self.users.remove(&id);
        Ok(true)
    }
}

#[async_trait]
impl RoomDirectory for Store {
    async fn find_room(&self, id: Id) -> Result<Option<Room>, StoreError> {
        Ok(self.room(id).await)
    }
}

#[async_trait]
impl UserDirectory for Store {
    async fn find_user(&self, id: Id) -> Result<Option<User>, StoreError> {
        Ok(self.user(id))
    }
}
