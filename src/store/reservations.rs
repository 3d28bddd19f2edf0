use async_trait::async_trait;
use tokio::sync::OwnedRwLockWriteGuard;

use super::{RoomState, Slot, Store, StoreError};
use crate::model::*;
use crate::ports::ReservationStore;

impl Store {
    pub fn reservation(&self, id: Id) -> Option<Reservation> {
        self.reservations.get(&id).map(|e| e.value().clone())
    }

    fn collect_reservations(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let mut rows: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|e| keep(e.value()))
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    /// Write-lock rooms in ascending id order so concurrent movers can't deadlock.
    async fn lock_rooms(
        &self,
        ids: &[Id],
    ) -> Result<Vec<OwnedRwLockWriteGuard<RoomState>>, StoreError> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let state = self
                .room_state(id)
                .ok_or(StoreError::Missing(Entity::Room, id))?;
            guards.push(state.write_owned().await);
        }
        Ok(guards)
    }

    pub async fn insert_reservation(
        &self,
        fields: NewReservation,
    ) -> Result<Reservation, StoreError> {
        let span = Span::checked(fields.start, fields.end).ok_or(StoreError::InvalidInterval {
            start: fields.start,
            end: fields.end,
        })?;
        let _gate = self.gate.read().await;

        if !self.users.contains_key(&fields.responsible_id) {
            return Err(StoreError::Missing(Entity::User, fields.responsible_id));
        }
        let state = self
            .room_state(fields.room_id)
            .ok_or(StoreError::Missing(Entity::Room, fields.room_id))?;
        let mut guard = state.write().await;

        if let Some(slot) = guard.first_overlap(&span, None) {
            return Err(StoreError::Overlap {
                room_id: fields.room_id,
                with: slot.id,
            });
        }

        let reservation = fields.into_reservation(self.sequences.next_reservation());
        self.wal_append(&Event::ReservationCreated(reservation.clone()))
            .await?;
        guard.insert_slot(Slot {
            id: reservation.id,
            span,
        });
        self.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    pub async fn update_reservation(
        &self,
        id: Id,
        patch: &ReservationPatch,
    ) -> Result<Option<Reservation>, StoreError> {
        let _gate = self.gate.read().await;

        loop {
            let Some(seen) = self.reservation(id) else {
                return Ok(None);
            };
            let target_room = patch.room_id.resolve(&seen.room_id);
            let mut guards = self.lock_rooms(&[seen.room_id, target_room]).await?;

            // The row may have moved between the read and the lock.
            let Some(current) = self.reservation(id) else {
                return Ok(None);
            };
            if current.room_id != seen.room_id {
                continue;
            }

            let updated = current.patched(patch);
            let span = Span::checked(updated.start, updated.end).ok_or(
                StoreError::InvalidInterval {
                    start: updated.start,
                    end: updated.end,
                },
            )?;
            if patch.responsible_id.is_set() && !self.users.contains_key(&updated.responsible_id)
            {
                return Err(StoreError::Missing(Entity::User, updated.responsible_id));
            }

            let Some(target) = guards.iter().find(|g| g.room.id == updated.room_id) else {
                return Err(StoreError::Missing(Entity::Room, updated.room_id));
            };
            if let Some(slot) = target.first_overlap(&span, Some(id)) {
                return Err(StoreError::Overlap {
                    room_id: updated.room_id,
                    with: slot.id,
                });
            }

            self.wal_append(&Event::ReservationUpdated {
                previous_room_id: current.room_id,
                reservation: updated.clone(),
            })
            .await?;

            for guard in guards.iter_mut() {
                if guard.room.id == current.room_id {
                    guard.remove_slot(id);
                }
            }
            for guard in guards.iter_mut() {
                if guard.room.id == updated.room_id {
                    guard.insert_slot(Slot { id, span });
                }
            }
            self.reservations.insert(id, updated.clone());
            return Ok(Some(updated));
        }
    }

    pub async fn delete_reservation(&self, id: Id) -> Result<bool, StoreError> {
        let _gate = self.gate.read().await;

        loop {
            let Some(seen) = self.reservation(id) else {
                return Ok(false);
            };
            let state = self
                .room_state(seen.room_id)
                .ok_or(StoreError::Missing(Entity::Room, seen.room_id))?;
            let mut guard = state.write().await;

            match self.reservation(id) {
                None => return Ok(false),
                Some(current) if current.room_id != seen.room_id => continue,
                Some(_) => {}
            }

            self.wal_append(&Event::ReservationDeleted {
                id,
                room_id: seen.room_id,
            })
            .await?;
            guard.remove_slot(id);
            self.reservations.remove(&id);
            return Ok(true);
        }
    }

    /// Reservations on `room_id` whose span overlaps `span`, minus `exclude_id`.
    pub async fn overlapping_reservations(
        &self,
        room_id: Id,
        span: Span,
        exclude_id: Option<Id>,
    ) -> Vec<Reservation> {
        let Some(state) = self.room_state(room_id) else {
            return Vec::new();
        };
        let guard = state.read().await;
        let mut rows: Vec<Reservation> = guard
            .overlapping(&span)
            .filter(|s| Some(s.id) != exclude_id)
            .filter_map(|s| self.reservation(s.id))
            .collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    pub fn list_reservations(&self) -> Vec<Reservation> {
        self.collect_reservations(|_| true)
    }
}

#[async_trait]
impl ReservationStore for Store {
    async fn insert(&self, fields: NewReservation) -> Result<Reservation, StoreError> {
        self.insert_reservation(fields).await
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservation(id))
    }

    async fn list_all(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.list_reservations())
    }

    async fn list_by_room(&self, room_id: Id) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.collect_reservations(|r| r.room_id == room_id))
    }

    async fn list_by_responsible(&self, user_id: Id) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.collect_reservations(|r| r.responsible_id == user_id))
    }

    async fn list_within(&self, period: Span) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.collect_reservations(|r| period.contains_span(&r.span())))
    }

    async fn find_overlapping(
        &self,
        room_id: Id,
        span: Span,
        exclude_id: Option<Id>,
    ) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.overlapping_reservations(room_id, span, exclude_id).await)
    }

    async fn update(
        &self,
        id: Id,
        patch: &ReservationPatch,
    ) -> Result<Option<Reservation>, StoreError> {
        self.update_reservation(id, patch).await
    }

    async fn delete(&self, id: Id) -> Result<bool, StoreError> {
        self.delete_reservation(id).await
    }
}
