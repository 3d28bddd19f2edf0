//! Contracts the reservation engine consumes.
//!
//! [`crate::store::Store`] implements all three; tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::model::*;
use crate::store::StoreError;

/// Existence lookup for rooms.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn find_room(&self, id: Id) -> Result<Option<Room>, StoreError>;
}

/// Existence lookup for users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: Id) -> Result<Option<User>, StoreError>;
}

/// Durable reservation rows plus the range queries the engine needs.
///
/// Every list is ordered by ascending id.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Persist a new row and return it with its assigned id.
    async fn insert(&self, fields: NewReservation) -> Result<Reservation, StoreError>;

    async fn find_by_id(&self, id: Id) -> Result<Option<Reservation>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Reservation>, StoreError>;

    async fn list_by_room(&self, room_id: Id) -> Result<Vec<Reservation>, StoreError>;

    async fn list_by_responsible(&self, user_id: Id) -> Result<Vec<Reservation>, StoreError>;

    /// Rows whose interval lies inside `period`, inclusive on both bounds.
    async fn list_within(&self, period: Span) -> Result<Vec<Reservation>, StoreError>;

    /// Rows on `room_id` overlapping `span`, skipping `exclude_id`.
    async fn find_overlapping(
        &self,
        room_id: Id,
        span: Span,
        exclude_id: Option<Id>,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Overwrite only the supplied fields. `None` if the row does not exist.
    async fn update(
        &self,
        id: Id,
        patch: &ReservationPatch,
    ) -> Result<Option<Reservation>, StoreError>;

    /// True if a row was removed.
    async fn delete(&self, id: Id) -> Result<bool, StoreError>;
}
