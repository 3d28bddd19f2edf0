use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// Bytes of framing around each payload: length prefix + CRC trailer.
const FRAME_OVERHEAD: u64 = 8;

/// Encode a single event to `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large for WAL"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

enum Frame {
    Event(Event, u64),
    /// Clean end of file.
    End,
    /// Truncated or corrupt entry; everything from here on is discarded.
    Torn,
}

fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// `remaining` is the number of unread bytes in the file; it bounds the
/// payload allocation when a corrupt length prefix claims gigabytes.
fn read_frame(reader: &mut impl Read, remaining: u64) -> io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    // A partial prefix also ends here; replay spots it via valid_len < file length.
    if !read_exact_or_eof(reader, &mut len_buf)? {
        return Ok(Frame::End);
    }
    let len = u32::from_le_bytes(len_buf) as u64;
    if len + FRAME_OVERHEAD > remaining {
        return Ok(Frame::Torn);
    }

    let mut payload = vec![0u8; len as usize];
    if !read_exact_or_eof(reader, &mut payload)? {
        return Ok(Frame::Torn);
    }
    let mut crc_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut crc_buf)? {
        return Ok(Frame::Torn);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Frame::Torn);
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Frame::Event(event, len + FRAME_OVERHEAD)),
        Err(_) => Ok(Frame::Torn),
    }
}

/// Result of reading a log from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte length of the valid prefix.
    pub valid_len: u64,
    /// True when bytes after `valid_len` were discarded.
    pub torn_tail: bool,
}

/// Append-only write-ahead log of store events.
///
/// Entry format: `[u32 LE: len][bincode: Event][u32 LE: crc32]`.
/// A torn last entry (crash mid-write) fails the length or CRC check, is
/// dropped on replay, and is cut off by [`Wal::recover`] so later appends stay readable.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    #[cfg(test)]
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::recover(path).map(|(wal, _)| wal)
    }

    /// Open (or create) the log at `path`, truncating any torn tail, and
    /// return the events recovered from disk.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replay = Self::replay(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if replay.torn_tail {
            warn!(
                path = %path.display(),
                valid_len = replay.valid_len,
                "discarding torn WAL tail"
            );
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        let wal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: replay.events.len() as u64,
        };
        Ok((wal, replay.events))
    }

    /// Append one event and fsync. Production code batches through
    /// `append_batch` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_batch([event])
    }

    /// Append every event, then fsync once. All or nothing: on failure the
    /// file is cut back to its length before the batch.
    pub fn append_batch<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> io::Result<()> {
        let committed = self.committed_len()?;
        let appends = self.appends_since_compact;
        let result = events
            .into_iter()
            .try_for_each(|event| self.append_buffered(event))
            .and_then(|()| self.flush_sync());
        if let Err(e) = result {
            self.rollback_to(committed, appends)?;
            return Err(e);
        }
        Ok(())
    }

    /// Length of the file with nothing left in the buffer.
    fn committed_len(&mut self) -> io::Result<u64> {
        self.writer.flush()?;
        Ok(self.writer.get_ref().metadata()?.len())
    }

    /// Drop buffered bytes and truncate the file to `len`.
    fn rollback_to(&mut self, len: u64, appends: u64) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        file.set_len(len)?;
        file.sync_all()?;
        // `into_parts` hands back the unwritten buffer instead of flushing it.
        let (_, _unwritten) = std::mem::replace(&mut self.writer, BufWriter::new(file)).into_parts();
        self.appends_since_compact = appends;
        Ok(())
    }

    /// Buffer an event without flushing.
    fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the buffer and fsync the file.
    fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write the compacted event set to a temp file next to the log and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::tmp_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the temp file over the log and reopen for appending.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        // Anything still buffered belongs to the old file.
        self.writer.flush()?;
        fs::rename(Self::tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read every valid event from `path`. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        loop {
            match read_frame(&mut reader, file_len - replay.valid_len)? {
                Frame::Event(event, frame_len) => {
                    replay.events.push(event);
                    replay.valid_len += frame_len;
                }
                Frame::End | Frame::Torn => break,
            }
        }
        replay.torn_tail = replay.valid_len < file_len;
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Reservation, Room};

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("reservo_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn room(id: i64) -> Event {
        Event::RoomCreated(Room {
            id,
            code: format!("R{id}"),
            name: "Meeting room".into(),
            location: "Floor 2".into(),
            capacity: 8,
        })
    }

    fn reservation(id: i64, room_id: i64) -> Event {
        Event::ReservationCreated(Reservation {
            id,
            room_id,
            responsible_id: 1,
            start: 1_000,
            end: 2_000,
            title: "Planning".into(),
            description: None,
        })
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![room(1), reservation(1, 1)];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed.events, events);
        assert!(!replayed.torn_tail);
        assert_eq!(replayed.valid_len, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let replayed = Wal::replay(&path).unwrap();
        assert!(replayed.events.is_empty());
        assert!(!replayed.torn_tail);
    }

    #[test]
    fn replay_stops_at_truncated_entry() {
        let path = tmp_path("truncation.wal");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&room(1)).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap(); // length prefix + partial payload
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed.events, vec![room(1)]);
        assert!(replayed.torn_tail);
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("corrupt_crc.wal");
        {
            let payload = bincode::serialize(&Event::RoomDeleted { id: 1 }).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert!(replayed.events.is_empty());
        assert!(replayed.torn_tail);
    }

    #[test]
    fn open_cuts_torn_tail_so_later_appends_replay() {
        let path = tmp_path("torn_then_append.wal");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&room(1)).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0xFFu8; 5]).unwrap();
        }
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&room(2)).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed.events, vec![room(1), room(2)]);
        assert!(!replayed.torn_tail);
    }

    #[test]
    fn compact_reduces_log_and_keeps_appending() {
        let path = tmp_path("compact.wal");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&room(1)).unwrap();
            for id in 1..=20 {
                wal.append(&reservation(id, 1)).unwrap();
                wal.append(&Event::ReservationDeleted { id, room_id: 1 }).unwrap();
            }
        }
        let before = fs::metadata(&path).unwrap().len();

        let compacted = vec![
            Event::IdWatermark { room: 1, user: 0, reservation: 20 },
            room(1),
        ];
        {
            let mut wal = Wal::open(&path).unwrap();
            assert_eq!(wal.appends_since_compact(), 41);
            wal.compact(&compacted).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            wal.append(&reservation(21, 1)).unwrap();
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed.events.len(), 3);
        assert_eq!(replayed.events[..2], compacted[..]);
        assert_eq!(replayed.events[2], reservation(21, 1));
    }

    #[test]
    fn append_batch_writes_all_events() {
        let path = tmp_path("batch.wal");
        let events: Vec<Event> = (1..=5).map(room).collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_batch(&events).unwrap();
            assert_eq!(wal.appends_since_compact(), 5);
        }

        assert_eq!(Wal::replay(&path).unwrap().events, events);
    }

    #[test]
    fn rollback_discards_failed_batch_bytes() {
        let path = tmp_path("rollback.wal");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&room(1)).unwrap();
            let committed = wal.committed_len().unwrap();
            let appends = wal.appends_since_compact();

            // Half a batch reached the disk, the rest is still buffered.
            wal.append_buffered(&room(2)).unwrap();
            wal.flush_sync().unwrap();
            wal.append_buffered(&room(3)).unwrap();
            {
                let mut f = OpenOptions::new().append(true).open(&path).unwrap();
                f.write_all(&[7u8, 0, 0]).unwrap();
            }

            wal.rollback_to(committed, appends).unwrap();
            assert_eq!(fs::metadata(&path).unwrap().len(), committed);
            assert_eq!(wal.appends_since_compact(), 1);

            wal.append(&room(4)).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed.events, vec![room(1), room(4)]);
        assert!(!replayed.torn_tail);
    }
}
