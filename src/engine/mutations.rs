use tracing::debug;

use crate::model::*;
use crate::store::StoreError;

use super::fields::{
    interval, require_id, validate_description, validate_span, validate_title,
};
use super::{Engine, EngineError, store_failure};

impl Engine {
    /// Book a room. Runs every check before the insert; a failure writes nothing.
    pub async fn create(&self, fields: NewReservation) -> Result<Reservation, EngineError> {
        require_id("room_id", fields.room_id)?;
        require_id("responsible_id", fields.responsible_id)?;
        self.require_room(fields.room_id).await?;
        self.require_user(fields.responsible_id).await?;

        let span = interval(fields.start, fields.end)?;
        validate_span(&span)?;
        validate_title(&fields.title)?;
        validate_description(fields.description.as_deref())?;

        self.checker
            .check_no_conflict(fields.room_id, span, None)
            .await?;

        let reservation = self
            .reservations
            .insert(fields)
            .await
            .map_err(store_failure("create_reservation", None))?;
        debug!(
            id = reservation.id,
            room_id = reservation.room_id,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Apply the supplied fields to a reservation that has not ended yet.
    pub async fn update(
        &self,
        id: Id,
        patch: &ReservationPatch,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        let current = self.require_reservation(id).await?;
        if current.is_finalized(now) {
            return Err(EngineError::Finalized(id));
        }

        if let Patch::Set(room_id) = patch.room_id
            && room_id != current.room_id
        {
            require_id("room_id", room_id)?;
            self.require_room(room_id).await?;
        }
        if let Patch::Set(user_id) = patch.responsible_id
            && user_id != current.responsible_id
        {
            require_id("responsible_id", user_id)?;
            self.require_user(user_id).await?;
        }

        let span = interval(
            patch.start.resolve(&current.start),
            patch.end.resolve(&current.end),
        )?;
        // Only the start is held to `now`; an ongoing reservation can still be edited.
        if span.start < now {
            return Err(EngineError::PastStart {
                start: span.start,
                now,
            });
        }
        validate_span(&span)?;
        if let Patch::Set(title) = &patch.title {
            validate_title(title)?;
        }
        if let Patch::Set(description) = &patch.description {
            validate_description(description.as_deref())?;
        }

        let room_id = patch.room_id.resolve(&current.room_id);
        self.checker
            .check_no_conflict(room_id, span, Some(id))
            .await?;

        let updated = self
            .reservations
            .update(id, patch)
            .await
            .map_err(store_failure("update_reservation", Some(id)))?
            .ok_or_else(|| {
                EngineError::from_store(
                    "update_reservation",
                    Some(id),
                    StoreError::NoRowsAffected(Entity::Reservation, id),
                )
            })?;
        debug!(id, room_id = updated.room_id, "reservation updated");
        Ok(updated)
    }

    /// Remove a reservation that has not ended yet.
    pub async fn delete(&self, id: Id, now: Ms) -> Result<(), EngineError> {
        let current = self.require_reservation(id).await?;
        if current.is_finalized(now) {
            return Err(EngineError::Finalized(id));
        }

        let removed = self
            .reservations
            .delete(id)
            .await
            .map_err(store_failure("delete_reservation", Some(id)))?;
        if !removed {
            // Existence was confirmed above, so zero rows is a store fault.
            return Err(EngineError::from_store(
                "delete_reservation",
                Some(id),
                StoreError::NoRowsAffected(Entity::Reservation, id),
            ));
        }
        debug!(id, room_id = current.room_id, "reservation deleted");
        Ok(())
    }
}
