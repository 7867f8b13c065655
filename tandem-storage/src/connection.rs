//! SQLite connections for one store: a single serialized writer and, for a
//! file-backed store, a round-robin set of query-only readers. An in-memory
//! store has no readers; its reads go through the writer.
//!
//! Session passes run on blocking threads while the scheduler runs on the
//! async runtime, so every connection sits behind a `std` mutex. Critical
//! sections never await.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use tandem_core::errors::TandemResult;

use crate::to_storage_err;

const MAX_READERS: usize = 8;

const WRITER_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
";

const READER_PRAGMAS: &str = "
    PRAGMA query_only = ON;
    PRAGMA temp_store = MEMORY;
";

pub struct Connections {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl Connections {
    /// Open the writer on `path`, then `reader_count` readers (clamped to 1..=8).
    pub fn open(path: &Path, reader_count: usize, busy_timeout: Duration) -> TandemResult<Self> {
        let writer = configured(Connection::open(path), WRITER_PRAGMAS, busy_timeout)?;
        let readers = (0..reader_count.clamp(1, MAX_READERS))
            .map(|_| {
                let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                configured(Connection::open_with_flags(path, flags), READER_PRAGMAS, busy_timeout)
                    .map(Mutex::new)
            })
            .collect::<TandemResult<Vec<_>>>()?;
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    pub fn open_in_memory() -> TandemResult<Self> {
        Ok(Self {
            writer: Mutex::new(configured(Connection::open_in_memory(), WRITER_PRAGMAS, Duration::ZERO)?),
            readers: Vec::new(),
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Run `f` on the writer. Writes from every worker serialize here.
    pub fn write<F, T>(&self, f: F) -> TandemResult<T>
    where
        F: FnOnce(&Connection) -> TandemResult<T>,
    {
        let conn = lock(&self.writer, "writer")?;
        f(&conn)
    }

    /// Run `f` on the next reader, or on the writer when there are none.
    pub fn read<F, T>(&self, f: F) -> TandemResult<T>
    where
        F: FnOnce(&Connection) -> TandemResult<T>,
    {
        if self.readers.is_empty() {
            return self.write(f);
        }
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = lock(&self.readers[idx], "reader")?;
        f(&conn)
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    /// The writer's journal mode, lowercased (`wal` for a file store).
    pub fn journal_mode(&self) -> TandemResult<String> {
        self.write(|conn| {
            conn.pragma_query_value(None, "journal_mode", |row| row.get::<_, String>(0))
                .map(|mode| mode.to_lowercase())
                .map_err(|e| to_storage_err(e.to_string()))
        })
    }
}

fn configured(
    opened: rusqlite::Result<Connection>,
    pragmas: &str,
    busy_timeout: Duration,
) -> TandemResult<Connection> {
    let conn = opened.map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute_batch(pragmas)
        .and_then(|()| conn.busy_timeout(busy_timeout))
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn)
}

fn lock<'a>(conn: &'a Mutex<Connection>, role: &str) -> TandemResult<MutexGuard<'a, Connection>> {
    conn.lock()
        .map_err(|e| to_storage_err(format!("{role} connection lock poisoned: {e}")))
}
