/// SQLite archive gateway.
pub mod sqlite;

use crate::{
    call::Call,
    session::Session,
    types::{CallId, RadioId, Seconds, SessionId},
};

/// Errors surfaced by archive gateways.
#[derive(Debug)]
pub enum PersistError {
    /// Underlying SQLite failure.
    Sqlite(rusqlite::Error),
    /// Gateway failure described as text.
    Message(String),
}

impl From<rusqlite::Error> for PersistError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Result alias for gateway operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// One sweep's worth of expired entities, offered to the gateway as a unit.
#[derive(Debug, Clone, Default)]
pub struct SweepBatch {
    /// Expired calls.
    pub calls: Vec<Call>,
    /// Last-seen times for the expired calls' radios.
    pub sightings: Vec<(RadioId, Seconds)>,
    /// Expired sessions.
    pub sessions: Vec<Session>,
}

impl SweepBatch {
    /// True when the batch carries no entities.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.sessions.is_empty()
    }

    /// Ids of the calls in the batch.
    pub fn call_ids(&self) -> Vec<CallId> {
        self.calls.iter().map(|call| call.id).collect()
    }

    /// Ids of the sessions in the batch.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|session| session.id).collect()
    }
}

/// Durable archive for expired entities.
///
/// The engine offers whole [`SweepBatch`]es and treats the outcome as
/// all-or-nothing: a failed batch is re-offered on a later sweep, so every
/// write must be an idempotent upsert.
pub trait ArchiveSink: Send {
    /// First id the engine may assign without colliding with stored rows.
    fn allocate_next_id(&mut self) -> PersistResult<u64>;

    /// Writes or updates one call.
    fn persist_call(&mut self, call: &Call) -> PersistResult<()>;

    /// Writes or updates one session.
    fn persist_session(&mut self, session: &Session) -> PersistResult<()>;

    /// Records the newest time a radio was heard.
    fn persist_radio_sighting(
        &mut self,
        radio_id: RadioId,
        last_seen: Seconds,
    ) -> PersistResult<()>;

    /// Writes a whole batch.
    ///
    /// The default writes row by row; implementations with transactions
    /// should override it so the batch lands atomically.
    fn archive(&mut self, batch: &SweepBatch) -> PersistResult<()> {
        for (radio_id, last_seen) in &batch.sightings {
            self.persist_radio_sighting(*radio_id, *last_seen)?;
        }
        for call in &batch.calls {
            self.persist_call(call)?;
        }
        for session in &batch.sessions {
            self.persist_session(session)?;
        }
        Ok(())
    }

    /// Pushes any buffered writes to durable storage.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}
