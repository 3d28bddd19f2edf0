//! Room and user management.

use std::sync::Arc;

use tracing::debug;

use crate::engine::fields::{require_email, require_text};
use crate::engine::{EngineError, store_failure};
use crate::limits::*;
use crate::model::*;
use crate::store::{Store, StoreError};

pub struct Directory {
    store: Arc<Store>,
}

fn validate_room_text(code: &str, name: &str, location: &str) -> Result<(), EngineError> {
    require_text("code", code, MAX_CODE_LEN, "room code too long")?;
    require_text("name", name, MAX_NAME_LEN, "room name too long")?;
    require_text("location", location, MAX_NAME_LEN, "room location too long")
}

fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if capacity == 0 {
        return Err(EngineError::InvalidField {
            field: "capacity",
            reason: "must be positive",
        });
    }
    Ok(())
}

fn validate_user_name(name: &str) -> Result<(), EngineError> {
    require_text("name", name, MAX_NAME_LEN, "user name too long")
}

fn no_rows(op: &'static str, entity: Entity, id: Id) -> EngineError {
    EngineError::from_store(op, Some(id), StoreError::NoRowsAffected(entity, id))
}

impl Directory {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    // ── Rooms ────────────────────────────────────────────

    pub async fn create_room(&self, fields: NewRoom) -> Result<Room, EngineError> {
        validate_room_text(&fields.code, &fields.name, &fields.location)?;
        validate_capacity(fields.capacity)?;
        let room = self
            .store
            .create_room(fields)
            .await
            .map_err(store_failure("create_room", None))?;
        debug!(id = room.id, code = %room.code, "room created");
        Ok(room)
    }

    pub async fn get_room(&self, id: Id) -> Result<Room, EngineError> {
        self.store
            .room(id)
            .await
            .ok_or(EngineError::NotFound(Entity::Room, id))
    }

    pub async fn list_rooms(&self) -> Vec<Room> {
        self.store.list_rooms().await
    }

    pub async fn update_room(&self, id: Id, patch: &RoomPatch) -> Result<Room, EngineError> {
        let current = self.get_room(id).await?;
        let next = current.patched(patch);
        validate_room_text(&next.code, &next.name, &next.location)?;
        validate_capacity(next.capacity)?;
        self.store
            .update_room(id, patch)
            .await
            .map_err(store_failure("update_room", Some(id)))?
            .ok_or_else(|| no_rows("update_room", Entity::Room, id))
    }

    /// Refused with `InUse` while any reservation books the room.
    pub async fn delete_room(&self, id: Id) -> Result<(), EngineError> {
        self.get_room(id).await?;
        let removed = self
            .store
            .delete_room(id)
            .await
            .map_err(store_failure("delete_room", Some(id)))?;
        if !removed {
            return Err(no_rows("delete_room", Entity::Room, id));
        }
        debug!(id, "room deleted");
        Ok(())
    }

    // ── Users ────────────────────────────────────────────

    pub async fn create_user(&self, fields: NewUser) -> Result<User, EngineError> {
        validate_user_name(&fields.name)?;
        require_email(&fields.email)?;
        let user = self
            .store
            .create_user(fields)
            .await
            .map_err(store_failure("create_user", None))?;
        debug!(id = user.id, "user created");
        Ok(user)
    }

    pub fn get_user(&self, id: Id) -> Result<User, EngineError> {
        self.store
            .user(id)
            .ok_or(EngineError::NotFound(Entity::User, id))
    }

    pub fn list_users(&self) -> Vec<User> {
        self.store.list_users()
    }

    pub async fn update_user(&self, id: Id, patch: &UserPatch) -> Result<User, EngineError> {
        let next = self.get_user(id)?.patched(patch);
        validate_user_name(&next.name)?;
        require_email(&next.email)?;
        self.store
            .update_user(id, patch)
            .await
            .map_err(store_failure("update_user", Some(id)))?
            .ok_or_else(|| no_rows("update_user", Entity::User, id))
    }

    /// Refused with `InUse` while the user is responsible for any reservation.
    pub async fn delete_user(&self, id: Id) -> Result<(), EngineError> {
        self.get_user(id)?;
        let removed = self
            .store
            .delete_user(id)
            .await
            .map_err(store_failure("delete_user", Some(id)))?;
        if !removed {
            return Err(no_rows("delete_user", Entity::User, id));
        }
        debug!(id, "user deleted");
        Ok(())
    }
}
