use std::sync::Arc;

use crate::model::*;
use crate::observability;
use crate::ports::ReservationStore;
use crate::store::StoreError;

use super::EngineError;
use super::error::store_failure;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Decides whether a candidate interval collides with other reservations on a room.
///
/// Read-only. Under concurrent writers the store's own exclusion check is the
/// final word; this is the fast path and the engine behind the availability query.
#[derive(Clone)]
pub struct ConflictChecker {
    reservations: Arc<dyn ReservationStore>,
}

impl ConflictChecker {
    pub fn new(reservations: Arc<dyn ReservationStore>) -> Self {
        Self { reservations }
    }

    /// Reservations on `room_id` overlapping `span`, other than `exclude_id`. Id ascending.
    pub async fn conflicts(
        &self,
        room_id: Id,
        span: Span,
        exclude_id: Option<Id>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let mut rows = self
            .reservations
            .find_overlapping(room_id, span, exclude_id)
            .await?;
        // Hold the store to the one overlap rule.
        rows.retain(|r| {
            r.room_id == room_id
                && Some(r.id) != exclude_id
                && overlaps(r.start, r.end, span.start, span.end)
        });
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    pub async fn has_conflict(
        &self,
        room_id: Id,
        span: Span,
        exclude_id: Option<Id>,
    ) -> Result<bool, StoreError> {
        Ok(!self.conflicts(room_id, span, exclude_id).await?.is_empty())
    }

    pub(crate) async fn check_no_conflict(
        &self,
        room_id: Id,
        span: Span,
        exclude_id: Option<Id>,
    ) -> Result<(), EngineError> {
        let rows = self
            .conflicts(room_id, span, exclude_id)
            .await
            .map_err(store_failure("check_conflict", Some(room_id)))?;
        if let Some(first) = rows.first() {
            metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict {
                room_id,
                with: first.id,
            });
        }
        Ok(())
    }
}
