use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// Larger length prefixes are treated as corruption rather than allocated.
const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

/// Frame one event as `[len][bincode][crc32]`. Returns the frame size in bytes.
fn write_record(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "journal record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(8 + u64::from(len))
}

/// Read one framed record and its frame size. `Ok(None)` means clean EOF or a
/// torn/corrupt tail.
fn read_record(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut word = [0u8; 4];
    if !read_full(reader, &mut word)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_RECORD_LEN {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut word)? {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, 8 + len as u64)))
}

/// `read_exact` that reports a short read as `false` instead of an error.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Intact events in order, plus the byte length they occupy.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0;
    while let Some((event, frame_len)) = read_record(&mut reader)? {
        events.push(event);
        valid_len += frame_len;
    }
    Ok((events, valid_len))
}

/// Append-only event journal backing the reservation store.
///
/// Each record is `[u32 LE: payload len][bincode: Event][u32 LE: crc32 of payload]`.
/// Replay stops at the first torn or corrupt record. Opening the journal cuts
/// such a tail off, and a failed append is cut back the same way, so a record
/// acknowledged as durable is never stranded behind garbage.
pub struct Journal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length up to the end of the last durable record.
    committed_len: u64,
    /// Set when an append failed and its bytes are not cut off yet.
    torn: bool,
    appends_since_compact: u64,
}

impl Journal {
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::recover(path).map(|(journal, _)| journal)
    }

    /// Replay the journal at `path`, drop any torn tail and open it for appending.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = scan(path)?;
        let file = Self::open_append(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > valid_len {
            warn!(
                path = %path.display(),
                discarded = on_disk - valid_len,
                "truncating torn journal tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        let journal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            committed_len: valid_len,
            torn: false,
            appends_since_compact: 0,
        };
        Ok((journal, events))
    }

    fn open_append(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// Write one record and fsync it. On failure the file is cut back to the
    /// last durable record before the error is returned.
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        if self.torn {
            self.rollback()?;
        }
        let written = write_record(&mut self.writer, event).and_then(|len| {
            self.sync()?;
            Ok(len)
        });
        match written {
            Ok(len) => {
                self.committed_len += len;
                self.appends_since_compact += 1;
                Ok(())
            }
            Err(e) => {
                self.torn = true;
                if let Err(rollback) = self.rollback() {
                    warn!(path = %self.path.display(), "journal rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }

    /// Discard buffered bytes and truncate the file to `committed_len`.
    fn rollback(&mut self) -> io::Result<()> {
        let file = Self::open_append(&self.path)?;
        file.set_len(self.committed_len)?;
        file.sync_all()?;
        self.replace_writer(file);
        self.torn = false;
        Ok(())
    }

    fn replace_writer(&mut self, file: File) {
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // `into_parts` hands back unwritten bytes instead of flushing them on drop.
        let _ = stale.into_parts();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("journal.tmp")
    }

    /// Write the compacted event list next to the journal and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_tmp_path(path))?);
        for event in events {
            write_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the journal and continue appending to it.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let file = Self::open_append(&self.path)?;
        self.committed_len = file.metadata()?.len();
        self.replace_writer(file);
        self.torn = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// All intact events in order. A missing file replays as empty.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }
}
