//! SQLite-backed archive of closed calls, sessions, and radio sightings.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    call::Call,
    session::Session,
    types::{CallId, RadioId, Seconds, SessionId, UsageMarker},
};

use super::{ArchiveSink, PersistResult, SweepBatch};

/// One archived call row.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRow {
    /// Call id.
    pub id: CallId,
    /// Source radio.
    pub radio_id: RadioId,
    /// Usage marker the call ended on.
    pub usage_marker: UsageMarker,
    /// Session the call was placed in, if any.
    pub session_id: Option<SessionId>,
    /// Whether any burst carried the emergency flag.
    pub is_emergency: bool,
    /// First burst time.
    pub start_time: Seconds,
    /// Last burst time.
    pub end_time: Seconds,
}

/// One archived session row.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    /// Session id.
    pub id: SessionId,
    /// Number of member calls at close.
    pub call_count: u64,
    /// Earliest member start.
    pub start_time: Seconds,
    /// Latest member end.
    pub end_time: Seconds,
}

/// SQLite implementation of [`crate::persist::ArchiveSink`].
pub struct SqliteArchive {
    conn: Connection,
}

impl SqliteArchive {
    /// Opens or creates a SQLite archive at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite archive.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Reads one archived call.
    pub fn load_call(&self, id: CallId) -> PersistResult<Option<CallRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, radio_id, usage_marker, session_id, is_emergency, start_time, end_time
                 FROM calls WHERE id = ?1",
                params![id as i64],
                |row| {
                    Ok(CallRow {
                        id: row.get::<_, i64>(0)? as CallId,
                        radio_id: row.get::<_, i64>(1)? as RadioId,
                        usage_marker: row.get::<_, i64>(2)? as UsageMarker,
                        session_id: row.get::<_, Option<i64>>(3)?.map(|v| v as SessionId),
                        is_emergency: row.get(4)?,
                        start_time: row.get(5)?,
                        end_time: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Reads one archived session.
    pub fn load_session(&self, id: SessionId) -> PersistResult<Option<SessionRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, call_count, start_time, end_time FROM sessions WHERE id = ?1",
                params![id as i64],
                |row| {
                    Ok(SessionRow {
                        id: row.get::<_, i64>(0)? as SessionId,
                        call_count: row.get::<_, i64>(1)? as u64,
                        start_time: row.get(2)?,
                        end_time: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Reads the stored last-seen time for a radio.
    pub fn radio_last_seen(&self, radio_id: RadioId) -> PersistResult<Option<Seconds>> {
        let seen = self
            .conn
            .query_row(
                "SELECT last_seen FROM radios WHERE id = ?1",
                params![radio_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seen)
    }

    /// Number of archived call rows.
    pub fn call_count(&self) -> PersistResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM calls", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of archived session rows.
    pub fn session_count(&self) -> PersistResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn max_stored_id(&self) -> PersistResult<u64> {
        // MAX over an empty table yields one NULL row, not zero rows.
        let calls: Option<i64> = self
            .conn
            .query_row("SELECT MAX(id) FROM calls", [], |row| row.get(0))?;
        let sessions: Option<i64> = self
            .conn
            .query_row("SELECT MAX(id) FROM sessions", [], |row| row.get(0))?;
        Ok(calls.max(sessions).unwrap_or(0) as u64)
    }
}

impl ArchiveSink for SqliteArchive {
    fn allocate_next_id(&mut self) -> PersistResult<u64> {
        Ok(self.max_stored_id()? + 1)
    }

    fn persist_call(&mut self, call: &Call) -> PersistResult<()> {
        upsert_call(&self.conn, call)
    }

    fn persist_session(&mut self, session: &Session) -> PersistResult<()> {
        upsert_session(&self.conn, session)
    }

    fn persist_radio_sighting(
        &mut self,
        radio_id: RadioId,
        last_seen: Seconds,
    ) -> PersistResult<()> {
        upsert_sighting(&self.conn, radio_id, last_seen)
    }

    fn archive(&mut self, batch: &SweepBatch) -> PersistResult<()> {
        let tx = self.conn.transaction()?;
        for (radio_id, last_seen) in &batch.sightings {
            upsert_sighting(&tx, *radio_id, *last_seen)?;
        }
        for call in &batch.calls {
            upsert_call(&tx, call)?;
        }
        for session in &batch.sessions {
            upsert_session(&tx, session)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }
}

fn upsert_call(conn: &Connection, call: &Call) -> PersistResult<()> {
    conn.execute(
        "INSERT INTO calls(id, radio_id, usage_marker, session_id, is_emergency, start_time, end_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             radio_id = excluded.radio_id,
             usage_marker = excluded.usage_marker,
             session_id = excluded.session_id,
             is_emergency = excluded.is_emergency,
             start_time = excluded.start_time,
             end_time = excluded.end_time",
        params![
            call.id as i64,
            call.radio_id as i64,
            call.usage_marker as i64,
            call.session_id.map(|v| v as i64),
            call.is_emergency,
            call.start_time,
            call.end_time,
        ],
    )?;
    Ok(())
}

fn upsert_session(conn: &Connection, session: &Session) -> PersistResult<()> {
    conn.execute(
        "INSERT INTO sessions(id, call_count, start_time, end_time)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             call_count = excluded.call_count,
             start_time = excluded.start_time,
             end_time = excluded.end_time",
        params![
            session.id as i64,
            session.call_count() as i64,
            session.start_time,
            session.end_time,
        ],
    )?;
    Ok(())
}

fn upsert_sighting(conn: &Connection, radio_id: RadioId, last_seen: Seconds) -> PersistResult<()> {
    conn.execute(
        "INSERT INTO radios(id, last_seen) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET last_seen = MAX(last_seen, excluded.last_seen)",
        params![radio_id as i64, last_seen],
    )?;
    Ok(())
}
