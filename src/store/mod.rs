mod directory;
mod reservations;
mod schedule;

pub use schedule::{RoomState, Slot};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tracing::info;

use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} {1} does not exist")]
    Missing(Entity, Id),
    #[error("interval overlaps reservation {with} in room {room_id}")]
    Overlap { room_id: Id, with: Id },
    #[error("{0} {1} is still referenced by reservations")]
    Referenced(Entity, Id),
    #[error("interval [{start}, {end}) is empty or inverted")]
    InvalidInterval { start: Ms, end: Ms },
    #[error("write to {0} {1} affected no rows")]
    NoRowsAffected(Entity, Id),
    #[error("WAL error: {0}")]
    Wal(String),
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
///
/// Blocks for the first append, drains whatever else is already queued,
/// then fsyncs once and answers every sender with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Commit what we have before a compaction or probe sees the log.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    wal.append_batch(batch.iter().map(|(event, _)| event))
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_batch([&event]);
            let _ = response.send(result);
        }
    }
}

/// Highest id issued per table. Only ever moves forward.
#[derive(Debug, Default)]
struct Sequences {
    room: AtomicI64,
    user: AtomicI64,
    reservation: AtomicI64,
}

impl Sequences {
    fn next(counter: &AtomicI64) -> Id {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_room(&self) -> Id {
        Self::next(&self.room)
    }

    fn next_user(&self) -> Id {
        Self::next(&self.user)
    }

    fn next_reservation(&self) -> Id {
        Self::next(&self.reservation)
    }
}

/// State rebuilt from the log before the live maps exist.
#[derive(Default)]
struct Recovered {
    rooms: HashMap<Id, RoomState>,
    users: HashMap<Id, User>,
    reservations: HashMap<Id, Reservation>,
    last_room: Id,
    last_user: Id,
    last_reservation: Id,
}

impl Recovered {
    fn apply(&mut self, event: Event) {
        match event {
            Event::RoomCreated(room) | Event::RoomUpdated(room) => {
                self.last_room = self.last_room.max(room.id);
                match self.rooms.get_mut(&room.id) {
                    Some(state) => state.room = room,
                    None => {
                        self.rooms.insert(room.id, RoomState::new(room));
                    }
                }
            }
            Event::RoomDeleted { id } => {
                self.rooms.remove(&id);
            }
            Event::UserCreated(user) | Event::UserUpdated(user) => {
                self.last_user = self.last_user.max(user.id);
                self.users.insert(user.id, user);
            }
            Event::UserDeleted { id } => {
                self.users.remove(&id);
            }
            Event::ReservationCreated(reservation) => {
                self.last_reservation = self.last_reservation.max(reservation.id);
                self.place(reservation);
            }
            Event::ReservationUpdated {
                previous_room_id,
                reservation,
            } => {
                if let Some(state) = self.rooms.get_mut(&previous_room_id) {
                    state.remove_slot(reservation.id);
                }
                self.place(reservation);
            }
            Event::ReservationDeleted { id, room_id } => {
                if let Some(state) = self.rooms.get_mut(&room_id) {
                    state.remove_slot(id);
                }
                self.reservations.remove(&id);
            }
            Event::IdWatermark {
                room,
                user,
                reservation,
            } => {
                self.last_room = self.last_room.max(room);
                self.last_user = self.last_user.max(user);
                self.last_reservation = self.last_reservation.max(reservation);
            }
        }
    }

    fn place(&mut self, reservation: Reservation) {
        if let Some(state) = self.rooms.get_mut(&reservation.room_id) {
            state.insert_slot(Slot {
                id: reservation.id,
                span: reservation.span(),
            });
        }
        self.reservations.insert(reservation.id, reservation);
    }
}

/// The durable store: rooms, users and reservations held in memory and made
/// durable by the WAL. Every write is logged before it is applied.
///
/// Exclusion is enforced here: inserts and updates re-check overlap while
/// holding the room's write lock, so two writers can never double-book.
pub struct Store {
    rooms: DashMap<Id, SharedRoomState>,
    users: DashMap<Id, User>,
    reservations: DashMap<Id, Reservation>,
    sequences: Sequences,
    /// Shared by ordinary writes; exclusive for deletes of referenced rows and compaction.
    gate: RwLock<()>,
    /// User rows have no lock of their own.
    user_writes: Mutex<()>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl Store {
    /// Replay the log at `wal_path` and start the writer task. Needs a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let event_count = events.len();
        let mut recovered = Recovered::default();
        for event in events {
            recovered.apply(event);
        }

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        info!(
            path = %wal_path.display(),
            events = event_count,
            rooms = recovered.rooms.len(),
            users = recovered.users.len(),
            reservations = recovered.reservations.len(),
            "store recovered"
        );

        Ok(Self {
            rooms: recovered
                .rooms
                .into_iter()
                .map(|(id, state)| (id, Arc::new(RwLock::new(state))))
                .collect(),
            users: recovered.users.into_iter().collect(),
            reservations: recovered.reservations.into_iter().collect(),
            sequences: Sequences {
                room: AtomicI64::new(recovered.last_room),
                user: AtomicI64::new(recovered.last_user),
                reservation: AtomicI64::new(recovered.last_reservation),
            },
            gate: RwLock::new(()),
            user_writes: Mutex::new(()),
            wal_tx,
        })
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    fn room_state(&self, id: Id) -> Option<SharedRoomState> {
        self.rooms.get(&id).map(|e| e.value().clone())
    }

    /// Rewrite the log as the minimal event set that recreates the current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.gate.write().await;

        let mut events = vec![Event::IdWatermark {
            room: self.sequences.room.load(Ordering::SeqCst),
            user: self.sequences.user.load(Ordering::SeqCst),
            reservation: self.sequences.reservation.load(Ordering::SeqCst),
        }];

        let mut rooms: Vec<(Id, SharedRoomState)> = self
            .rooms
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        rooms.sort_by_key(|(id, _)| *id);
        for (_, state) in rooms {
            events.push(Event::RoomCreated(state.read().await.room.clone()));
        }

        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        events.extend(users.into_iter().map(Event::UserCreated));

        let mut reservations: Vec<Reservation> =
            self.reservations.iter().map(|e| e.value().clone()).collect();
        reservations.sort_by_key(|r| r.id);
        events.extend(reservations.into_iter().map(Event::ReservationCreated));

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
