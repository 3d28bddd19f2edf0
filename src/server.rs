//! Line-oriented front end: one SQL statement per line in, one JSON reply per line out.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{Instrument, debug, info_span, warn};
use ulid::Ulid;

use crate::directory::Directory;
use crate::engine::{ConflictReport, Engine, EngineError, now_ms};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, ReservationFilter, SqlError};
use crate::store::Store;

use framing::{Frame, StatementCodec};

mod framing {
    use std::io;

    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

    /// A decoded input line, or the marker left by one that was too long.
    #[derive(Debug, PartialEq, Eq)]
    pub enum Frame {
        Line(String),
        TooLong,
    }

    /// `LinesCodec` that reports over-long lines as a frame instead of an error,
    /// so the connection survives them. The codec discards the rest of that line.
    pub struct StatementCodec {
        inner: LinesCodec,
    }

    impl StatementCodec {
        pub fn new(max_length: usize) -> Self {
            Self {
                inner: LinesCodec::new_with_max_length(max_length),
            }
        }
    }

    fn into_io(err: LinesCodecError) -> io::Error {
        match err {
            LinesCodecError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }

    impl Decoder for StatementCodec {
        type Item = Frame;
        type Error = io::Error;

        fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
            match self.inner.decode(buf) {
                Ok(line) => Ok(line.map(Frame::Line)),
                Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::TooLong)),
                Err(e) => Err(into_io(e)),
            }
        }

        fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
            match self.inner.decode_eof(buf) {
                Ok(line) => Ok(line.map(Frame::Line)),
                Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::TooLong)),
                Err(e) => Err(into_io(e)),
            }
        }
    }

    impl Encoder<String> for StatementCodec {
        type Error = io::Error;

        fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), io::Error> {
            self.inner.encode(line, buf).map_err(into_io)
        }
    }
}

// ── Replies ──────────────────────────────────────────────────

/// A reservation as shown to clients, with its derived status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationRow {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub status: ReservationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Row {
    Room(Room),
    User(User),
    Reservation(ReservationRow),
    Availability(ConflictReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok { tag: String, rows: Vec<Row> },
    Error { kind: &'static str, message: String },
}

impl Reply {
    fn ok(verb: &str, rows: Vec<Row>) -> Self {
        Reply::Ok {
            tag: format!("{verb} {}", rows.len()),
            rows,
        }
    }

    fn done(verb: &str) -> Self {
        Reply::Ok {
            tag: format!("{verb} 1"),
            rows: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Ok { .. } => "ok",
            Reply::Error { kind, .. } => *kind,
        }
    }

    fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"error","kind":"internal","message":"{e}"}}"#)
        })
    }
}

impl From<EngineError> for Reply {
    fn from(err: EngineError) -> Self {
        Reply::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<SqlError> for Reply {
    fn from(err: SqlError) -> Self {
        Reply::Error {
            kind: "syntax",
            message: err.to_string(),
        }
    }
}

// ── Handler ──────────────────────────────────────────────────

/// Executes statements against the engine and the directory.
pub struct Handler {
    engine: Engine,
    directory: Directory,
    clock: fn() -> Ms,
}

impl Handler {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            engine: Engine::with_store(store.clone()),
            directory: Directory::new(store),
            clock: now_ms,
        }
    }

    /// Replace the wall clock, e.g. with a fixed instant in tests.
    pub fn with_clock(mut self, clock: fn() -> Ms) -> Self {
        self.clock = clock;
        self
    }

    pub async fn execute(&self, line: &str) -> Reply {
        let started = Instant::now();
        let (label, reply) = match sql::parse_sql(line) {
            Ok(cmd) => {
                let label = observability::command_label(&cmd);
                let now = (self.clock)();
                let reply = self.run(cmd, now).await.unwrap_or_else(Reply::from);
                (label, reply)
            }
            Err(e) => ("unparsed", Reply::from(e)),
        };

        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => reply.kind())
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        reply
    }

    async fn run(&self, cmd: Command, now: Ms) -> Result<Reply, EngineError> {
        let reservation_row = |reservation: Reservation| {
            Row::Reservation(ReservationRow {
                status: reservation.status(now),
                reservation,
            })
        };

        let reply = match cmd {
            Command::InsertRoom(fields) => {
                let room = self.directory.create_room(fields).await?;
                Reply::ok("INSERT", vec![Row::Room(room)])
            }
            Command::InsertUser(fields) => {
                let user = self.directory.create_user(fields).await?;
                Reply::ok("INSERT", vec![Row::User(user)])
            }
            Command::InsertReservation(fields) => {
                let reservation = self.engine.create(fields).await?;
                Reply::ok("INSERT", vec![reservation_row(reservation)])
            }
            Command::UpdateRoom { id, patch } => {
                let room = self.directory.update_room(id, &patch).await?;
                Reply::ok("UPDATE", vec![Row::Room(room)])
            }
            Command::UpdateUser { id, patch } => {
                let user = self.directory.update_user(id, &patch).await?;
                Reply::ok("UPDATE", vec![Row::User(user)])
            }
            Command::UpdateReservation { id, patch } => {
                let reservation = self.engine.update(id, &patch, now).await?;
                Reply::ok("UPDATE", vec![reservation_row(reservation)])
            }
            Command::DeleteRoom { id } => {
                self.directory.delete_room(id).await?;
                Reply::done("DELETE")
            }
            Command::DeleteUser { id } => {
                self.directory.delete_user(id).await?;
                Reply::done("DELETE")
            }
            Command::DeleteReservation { id } => {
                self.engine.delete(id, now).await?;
                Reply::done("DELETE")
            }
            Command::SelectRooms { id: Some(id) } => {
                let room = self.directory.get_room(id).await?;
                Reply::ok("SELECT", vec![Row::Room(room)])
            }
            Command::SelectRooms { id: None } => {
                let rooms = self.directory.list_rooms().await;
                Reply::ok("SELECT", rooms.into_iter().map(Row::Room).collect())
            }
            Command::SelectUsers { id: Some(id) } => {
                let user = self.directory.get_user(id)?;
                Reply::ok("SELECT", vec![Row::User(user)])
            }
            Command::SelectUsers { id: None } => {
                let users = self.directory.list_users();
                Reply::ok("SELECT", users.into_iter().map(Row::User).collect())
            }
            Command::SelectReservations(filter) => {
                let rows = match filter {
                    ReservationFilter::All => self.engine.list_all().await?,
                    ReservationFilter::Id(id) => vec![self.engine.get(id).await?],
                    ReservationFilter::Room(room_id) => self.engine.list_by_room(room_id).await?,
                    ReservationFilter::Responsible(user_id) => {
                        self.engine.list_by_responsible(user_id).await?
                    }
                    ReservationFilter::Period { start, end } => {
                        self.engine.list_by_period(start, end).await?
                    }
                };
                Reply::ok("SELECT", rows.into_iter().map(reservation_row).collect())
            }
            Command::SelectAvailability {
                room_id,
                start,
                end,
                exclude_id,
            } => {
                let report = self
                    .engine
                    .check_conflict(room_id, start, end, exclude_id)
                    .await?;
                Reply::ok("SELECT", vec![Row::Availability(report)])
            }
        };
        Ok(reply)
    }
}

// ── Connection loop ──────────────────────────────────────────

/// Serve one client until it disconnects.
pub async fn process_connection<S>(socket: S, peer: SocketAddr, handler: Arc<Handler>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let session = Ulid::new();
    let span = info_span!("session", id = %session, %peer);
    serve(socket, handler).instrument(span).await
}

async fn serve<S>(socket: S, handler: Arc<Handler>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, StatementCodec::new(MAX_LINE_LEN));
    while let Some(frame) = framed.next().await {
        let reply = match frame? {
            Frame::Line(line) => {
                debug!(statement = %line, "execute");
                handler.execute(&line).await
            }
            Frame::TooLong => {
                warn!(max = MAX_LINE_LEN, "statement line too long");
                Reply::from(EngineError::LimitExceeded("statement line too long"))
            }
        };
        framed.send(reply.to_line()).await?;
    }
    debug!("client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;

    fn test_store(name: &str) -> Arc<Store> {
        let dir = std::env::temp_dir().join("reservo_test_server");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        Arc::new(Store::open(path).unwrap())
    }

    // 2099-01-01T12:00:00Z
    fn fixed_now() -> Ms {
        4_070_952_000_000
    }

    fn handler(name: &str) -> Handler {
        Handler::new(test_store(name)).with_clock(fixed_now)
    }

    fn json(reply: &Reply) -> serde_json::Value {
        serde_json::to_value(reply).unwrap()
    }

    async fn seed(h: &Handler) {
        let room = h
            .execute("INSERT INTO rooms (code, name, location, capacity) VALUES ('B-101', 'Seminar', 'Block B', 30)")
            .await;
        assert_eq!(room.kind(), "ok");
        let user = h
            .execute("INSERT INTO users (name, email) VALUES ('Ana', 'ana@uni.edu')")
            .await;
        assert_eq!(user.kind(), "ok");
    }

    #[tokio::test]
    async fn insert_reply_shape() {
        let h = handler("insert_shape.wal");
        seed(&h).await;
        let reply = h
            .execute(
                "INSERT INTO reservations (room_id, responsible_id, start, \"end\", title) \
                 VALUES (1, 1, '2099-03-01T09:00:00Z', '2099-03-01T10:00:00Z', 'Kickoff')",
            )
            .await;
        let v = json(&reply);
        assert_eq!(v["status"], "ok");
        assert_eq!(v["tag"], "INSERT 1");
        assert_eq!(v["rows"][0]["id"], 1);
        assert_eq!(v["rows"][0]["title"], "Kickoff");
        assert_eq!(v["rows"][0]["status"], "scheduled");
        assert_eq!(v["rows"][0]["description"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn errors_carry_kind() {
        let h = handler("error_kinds.wal");
        seed(&h).await;
        let insert = "INSERT INTO reservations (room_id, responsible_id, start, \"end\", title) \
                      VALUES (1, 1, '2099-03-01T09:00:00Z', '2099-03-01T10:00:00Z', 'Kickoff')";
        assert_eq!(h.execute(insert).await.kind(), "ok");
        assert_eq!(h.execute(insert).await.kind(), "conflict");

        let v = json(&h.execute("SELECT * FROM rooms WHERE id = 42").await);
        assert_eq!(v["status"], "error");
        assert_eq!(v["kind"], "not_found");
        assert_eq!(v["message"], "room not found: 42");

        assert_eq!(h.execute("SELEKT nothing").await.kind(), "syntax");
        assert_eq!(h.execute("DELETE FROM rooms WHERE id = 1").await.kind(), "in_use");
    }

    #[tokio::test]
    async fn missing_rows_by_id_are_not_found() {
        let h = handler("missing_by_id.wal");
        for (sql, message) in [
            ("SELECT * FROM rooms WHERE id = 42", "room not found: 42"),
            ("SELECT * FROM users WHERE id = 42", "user not found: 42"),
            ("SELECT * FROM reservations WHERE id = 42", "reservation not found: 42"),
        ] {
            let v = json(&h.execute(sql).await);
            assert_eq!(v["status"], "error", "{sql}");
            assert_eq!(v["kind"], "not_found", "{sql}");
            assert_eq!(v["message"], message);
        }
        assert_eq!(h.execute("SELECT * FROM reservations").await.kind(), "ok");
    }

    #[tokio::test]
    async fn finalized_rows_show_status() {
        let h = handler("finalized.wal");
        seed(&h).await;
        let reply = h
            .execute(
                "INSERT INTO reservations (room_id, responsible_id, start, \"end\", title) \
                 VALUES (1, 1, '2098-03-01T09:00:00Z', '2098-03-01T10:00:00Z', 'Old')",
            )
            .await;
        assert_eq!(json(&reply)["rows"][0]["status"], "finalized");
        assert_eq!(
            h.execute("DELETE FROM reservations WHERE id = 1").await.kind(),
            "finalized"
        );
    }

    #[tokio::test]
    async fn availability_select() {
        let h = handler("availability.wal");
        seed(&h).await;
        h.execute(
            "INSERT INTO reservations VALUES (1, 1, '2099-03-01T09:00:00Z', '2099-03-01T10:00:00Z', 'Kickoff', NULL)",
        )
        .await;
        let busy = json(
            &h.execute(
                "SELECT * FROM availability WHERE room_id = 1 \
                 AND start >= '2099-03-01T09:30:00Z' AND \"end\" <= '2099-03-01T11:00:00Z'",
            )
            .await,
        );
        assert_eq!(busy["rows"][0]["conflict"], true);
        assert_eq!(busy["rows"][0]["conflicting_ids"], serde_json::json!([1]));

        let own = json(
            &h.execute(
                "SELECT * FROM availability WHERE room_id = 1 \
                 AND start >= '2099-03-01T09:30:00Z' AND \"end\" <= '2099-03-01T11:00:00Z' \
                 AND exclude_id = 1",
            )
            .await,
        );
        assert_eq!(own["rows"][0]["conflict"], false);
        assert_eq!(own["rows"][0]["message"], "time slot is available");
    }

    #[tokio::test]
    async fn over_long_line_keeps_connection() {
        let h = Arc::new(handler("long_line.wal"));
        let (client, server) = tokio::io::duplex(64 * 1024);
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let task = tokio::spawn(process_connection(server, peer, h));

        let (read, mut write) = tokio::io::split(client);
        let mut lines = BufReader::new(read).lines();

        let mut long = "x".repeat(MAX_LINE_LEN + 10);
        long.push('\n');
        write.write_all(long.as_bytes()).await.unwrap();
        let first: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["kind"], "limit_exceeded");

        write.write_all(b"SELECT * FROM rooms\n").await.unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["status"], "ok");
        assert_eq!(second["tag"], "SELECT 0");

        drop(write);
        drop(lines);
        task.await.unwrap().unwrap();
    }
}
