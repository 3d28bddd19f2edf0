use crate::model::{Entity, Id, Ms};
use crate::observability;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} not found: {1}")]
    NotFound(Entity, Id),
    #[error("invalid interval: start {start} must be before end {end}")]
    InvalidInterval { start: Ms, end: Ms },
    #[error("room {room_id} is already reserved in that interval (reservation {with})")]
    Conflict { room_id: Id, with: Id },
    #[error("reservation {0} has already ended and can no longer be changed")]
    Finalized(Id),
    #[error("start {start} is in the past (now {now})")]
    PastStart { start: Ms, now: Ms },
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("cannot delete {0} {1}: still referenced by reservations")]
    InUse(Entity, Id),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// Unexpected persistence failure. The cause is logged, never shown to callers.
    #[error("internal error")]
    Store(#[source] StoreError),
}

impl EngineError {
    /// Stable label for the wire and for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(..) => "not_found",
            EngineError::InvalidInterval { .. } => "invalid_interval",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Finalized(_) => "finalized",
            EngineError::PastStart { .. } => "past_start",
            EngineError::InvalidField { .. } => "invalid_field",
            EngineError::InUse(..) => "in_use",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Store(_) => "internal",
        }
    }

    /// Translate a store error raised while running `op` on `id`.
    pub(crate) fn from_store(op: &'static str, id: Option<Id>, err: StoreError) -> Self {
        match err {
            StoreError::Missing(entity, id) => EngineError::NotFound(entity, id),
            StoreError::Overlap { room_id, with } => {
                metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
                EngineError::Conflict { room_id, with }
            }
            StoreError::Referenced(entity, id) => EngineError::InUse(entity, id),
            StoreError::InvalidInterval { start, end } => {
                EngineError::InvalidInterval { start, end }
            }
            other => {
                tracing::error!(op, id = ?id, error = %other, "store failure");
                metrics::counter!(observability::STORE_FAILURES_TOTAL, "op" => op).increment(1);
                EngineError::Store(other)
            }
        }
    }
}

/// `map_err` adapter for [`EngineError::from_store`].
pub(crate) fn store_failure(
    op: &'static str,
    id: Option<Id>,
) -> impl FnOnce(StoreError) -> EngineError {
    move |err| EngineError::from_store(op, id, err)
}
