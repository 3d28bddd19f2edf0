use std::fmt;

use serde::{Deserialize, Serialize};

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Row identifier. Positive, assigned by the store, never reused.
pub type Id = i64;

/// True iff `[start, end)` is non-empty.
pub fn is_valid_interval(start: Ms, end: Ms) -> bool {
    start < end
}

/// The overlap rule for half-open intervals. Touching intervals do not overlap.
pub fn overlaps(a_start: Ms, a_end: Ms, b_start: Ms, b_end: Ms) -> bool {
    a_start < b_end && a_end > b_start
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` for empty or inverted intervals.
    pub fn checked(start: Ms, end: Ms) -> Option<Self> {
        is_valid_interval(start, end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    /// Inclusive on both bounds. Only period listings use this; conflicts use `overlaps`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Field presence for partial updates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn resolve(&self, current: &T) -> T
    where
        T: Clone,
    {
        match self {
            Patch::Set(v) => v.clone(),
            Patch::Keep => current.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Room,
    User,
    Reservation,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Room => "room",
            Entity::User => "user",
            Entity::Reservation => "reservation",
        })
    }
}

// ── Rooms ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Id,
    pub code: String,
    pub name: String,
    pub location: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub code: String,
    pub name: String,
    pub location: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomPatch {
    pub code: Patch<String>,
    pub name: Patch<String>,
    pub location: Patch<String>,
    pub capacity: Patch<u32>,
}

impl Room {
    pub fn patched(&self, patch: &RoomPatch) -> Room {
        Room {
            id: self.id,
            code: patch.code.resolve(&self.code),
            name: patch.name.resolve(&self.name),
            location: patch.location.resolve(&self.location),
            capacity: patch.capacity.resolve(&self.capacity),
        }
    }
}

// ── Users ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserPatch {
    pub name: Patch<String>,
    pub email: Patch<String>,
}

impl User {
    pub fn patched(&self, patch: &UserPatch) -> User {
        User {
            id: self.id,
            name: patch.name.resolve(&self.name),
            email: patch.email.resolve(&self.email),
        }
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// `end >= now`: may still be updated or deleted.
    Scheduled,
    /// `end < now`: immutable history.
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Id,
    pub room_id: Id,
    pub responsible_id: Id,
    pub start: Ms,
    pub end: Ms,
    pub title: String,
    pub description: Option<String>,
}

impl Reservation {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    pub fn is_finalized(&self, now: Ms) -> bool {
        self.end < now
    }

    pub fn status(&self, now: Ms) -> ReservationStatus {
        if self.is_finalized(now) {
            ReservationStatus::Finalized
        } else {
            ReservationStatus::Scheduled
        }
    }

    /// Apply only the supplied fields.
    pub fn patched(&self, patch: &ReservationPatch) -> Reservation {
        Reservation {
            id: self.id,
            room_id: patch.room_id.resolve(&self.room_id),
            responsible_id: patch.responsible_id.resolve(&self.responsible_id),
            start: patch.start.resolve(&self.start),
            end: patch.end.resolve(&self.end),
            title: patch.title.resolve(&self.title),
            description: patch.description.resolve(&self.description),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub room_id: Id,
    pub responsible_id: Id,
    pub start: Ms,
    pub end: Ms,
    pub title: String,
    pub description: Option<String>,
}

impl NewReservation {
    pub fn into_reservation(self, id: Id) -> Reservation {
        Reservation {
            id,
            room_id: self.room_id,
            responsible_id: self.responsible_id,
            start: self.start,
            end: self.end,
            title: self.title,
            description: self.description,
        }
    }
}

/// `description: Set(None)` clears the description; `Keep` leaves it alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReservationPatch {
    pub room_id: Patch<Id>,
    pub responsible_id: Patch<Id>,
    pub start: Patch<Ms>,
    pub end: Patch<Ms>,
    pub title: Patch<String>,
    pub description: Patch<Option<String>>,
}

/// WAL record format. Each variant carries the full row it writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated(Room),
    RoomUpdated(Room),
    RoomDeleted { id: Id },
    UserCreated(User),
    UserUpdated(User),
    UserDeleted { id: Id },
    ReservationCreated(Reservation),
    ReservationUpdated {
        previous_room_id: Id,
        reservation: Reservation,
    },
    ReservationDeleted { id: Id, room_id: Id },
    /// Highest ids ever issued. Written by compaction so ids of deleted rows stay burnt.
    IdWatermark { room: Id, user: Id, reservation: Id },
}
