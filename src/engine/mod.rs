mod conflict;
mod error;
pub(crate) mod fields;
mod mutations;
mod queries;

pub use conflict::{ConflictChecker, now_ms};
pub use error::EngineError;
pub use queries::ConflictReport;

pub(crate) use error::store_failure;

use std::sync::Arc;

use crate::model::*;
use crate::ports::{ReservationStore, RoomDirectory, UserDirectory};
use crate::store::Store;

/// The reservation lifecycle service.
///
/// Validates every mutation against the directories, the interval rules and
/// the conflict checker before a single write reaches the store. Operations
/// that depend on wall-clock time take `now` explicitly.
pub struct Engine {
    rooms: Arc<dyn RoomDirectory>,
    users: Arc<dyn UserDirectory>,
    reservations: Arc<dyn ReservationStore>,
    checker: ConflictChecker,
}

impl Engine {
    pub fn new(
        rooms: Arc<dyn RoomDirectory>,
        users: Arc<dyn UserDirectory>,
        reservations: Arc<dyn ReservationStore>,
    ) -> Self {
        let checker = ConflictChecker::new(reservations.clone());
        Self {
            rooms,
            users,
            reservations,
            checker,
        }
    }

    /// Wire every port to the same durable store.
    pub fn with_store(store: Arc<Store>) -> Self {
        Self::new(store.clone(), store.clone(), store)
    }

    pub(super) async fn require_room(&self, id: Id) -> Result<Room, EngineError> {
        self.rooms
            .find_room(id)
            .await
            .map_err(store_failure("find_room", Some(id)))?
            .ok_or(EngineError::NotFound(Entity::Room, id))
    }

    pub(super) async fn require_user(&self, id: Id) -> Result<User, EngineError> {
        self.users
            .find_user(id)
            .await
            .map_err(store_failure("find_user", Some(id)))?
            .ok_or(EngineError::NotFound(Entity::User, id))
    }

    pub(super) async fn require_reservation(&self, id: Id) -> Result<Reservation, EngineError> {
        self.reservations
            .find_by_id(id)
            .await
            .map_err(store_failure("find_reservation", Some(id)))?
            .ok_or(EngineError::NotFound(Entity::Reservation, id))
    }
}
