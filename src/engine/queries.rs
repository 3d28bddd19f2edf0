use serde::Serialize;

use crate::model::*;

use super::fields::{interval, require_id};
use super::{Engine, EngineError, store_failure};

/// Answer to a standalone availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub room_id: Id,
    pub start: Ms,
    pub end: Ms,
    pub conflict: bool,
    /// Ids of the reservations in the way, ascending.
    pub conflicting_ids: Vec<Id>,
    pub message: String,
}

impl Engine {
    pub async fn find(&self, id: Id) -> Result<Option<Reservation>, EngineError> {
        self.reservations
            .find_by_id(id)
            .await
            .map_err(store_failure("find_reservation", Some(id)))
    }

    /// Like [`Engine::find`], but a missing row is `NotFound`.
    pub async fn get(&self, id: Id) -> Result<Reservation, EngineError> {
        self.require_reservation(id).await
    }

    pub async fn list_all(&self) -> Result<Vec<Reservation>, EngineError> {
        self.reservations
            .list_all()
            .await
            .map_err(store_failure("list_reservations", None))
    }

    pub async fn list_by_room(&self, room_id: Id) -> Result<Vec<Reservation>, EngineError> {
        self.require_room(room_id).await?;
        self.reservations
            .list_by_room(room_id)
            .await
            .map_err(store_failure("list_by_room", Some(room_id)))
    }

    pub async fn list_by_responsible(&self, user_id: Id) -> Result<Vec<Reservation>, EngineError> {
        self.require_user(user_id).await?;
        self.reservations
            .list_by_responsible(user_id)
            .await
            .map_err(store_failure("list_by_responsible", Some(user_id)))
    }

    /// Reservations lying entirely inside `[start, end]`, both bounds inclusive.
    pub async fn list_by_period(&self, start: Ms, end: Ms) -> Result<Vec<Reservation>, EngineError> {
        let period = interval(start, end)?;
        self.reservations
            .list_within(period)
            .await
            .map_err(store_failure("list_by_period", None))
    }

    /// Pre-flight a candidate slot without booking it.
    pub async fn check_conflict(
        &self,
        room_id: Id,
        start: Ms,
        end: Ms,
        exclude_id: Option<Id>,
    ) -> Result<ConflictReport, EngineError> {
        require_id("room_id", room_id)?;
        self.require_room(room_id).await?;
        let span = interval(start, end)?;

        let rows = self
            .checker
            .conflicts(room_id, span, exclude_id)
            .await
            .map_err(store_failure("check_conflict", Some(room_id)))?;
        let conflict = !rows.is_empty();
        let message = if conflict {
            "time slot is not available"
        } else {
            "time slot is available"
        };
        Ok(ConflictReport {
            room_id,
            start,
            end,
            conflict,
            conflicting_ids: rows.iter().map(|r| r.id).collect(),
            message: message.to_string(),
        })
    }
}
