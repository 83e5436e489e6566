use hashbrown::HashMap;

use crate::{
    burst::BurstRecord,
    call::Call,
    core::stats::{Counters, StatsSnapshot},
    session::Session,
    types::{CallId, EntityId, Phase, RadioId, Seconds, SessionId},
};

/// Live-set rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No live call with this id.
    MissingCall(CallId),
    /// No live session with this id.
    MissingSession(SessionId),
    /// The call is closing and no longer accepts updates.
    CallClosing(CallId),
}

/// Authoritative in-memory working set of open and closing entities.
///
/// One shared counter hands out call and session ids, so no id is ever used
/// twice; seed it above the highest persisted id with [`LiveStore::with_first_id`]
/// to keep that guarantee across restarts. All mutation goes through the
/// single owner of this value.
#[derive(Debug, Default)]
pub struct LiveStore {
    calls: HashMap<CallId, Call>,
    call_order: Vec<CallId>,
    open_by_radio: HashMap<RadioId, Vec<CallId>>,
    sessions: HashMap<SessionId, Session>,
    session_order: Vec<SessionId>,
    sightings: HashMap<RadioId, Seconds>,
    last_burst_time: Seconds,
    next_id: EntityId,
    counters: Counters,
}

impl LiveStore {
    /// Empty store with the id counter starting at 1.
    pub fn new() -> Self {
        Self::with_first_id(1)
    }

    /// Empty store whose id counter starts at `first_id` (floored at 1),
    /// typically the gateway's `allocate_next_id` result.
    pub fn with_first_id(first_id: EntityId) -> Self {
        Self {
            next_id: first_id.max(1),
            ..Self::default()
        }
    }

    /// Advances the engine clock and the radio sighting map for an accepted
    /// record. Both are max-based so late deliveries cannot pull time back.
    pub fn observe(&mut self, record: &BurstRecord) {
        let seen = self.sightings.entry(record.radio_id).or_insert(record.timestamp);
        *seen = seen.max(record.timestamp);
        self.last_burst_time = self.last_burst_time.max(record.timestamp);
    }

    /// Highest accepted burst timestamp; the engine's notion of "now".
    pub fn last_burst_time(&self) -> Seconds {
        self.last_burst_time
    }

    /// Finds the first open call for the record's radio whose marker is
    /// within `tolerance`, and extends it with the record.
    pub fn match_burst(&mut self, record: &BurstRecord, tolerance: u8) -> Option<CallId> {
        let candidates = self.open_by_radio.get(&record.radio_id)?;
        let id = candidates
            .iter()
            .copied()
            .find(|id| self.calls.get(id).is_some_and(|c| c.matches(record, tolerance)))?;
        if let Some(call) = self.calls.get_mut(&id) {
            call.extend(record);
        }
        Some(id)
    }

    /// Opens a new call around `record` and indexes it.
    pub fn open_call(&mut self, record: &BurstRecord) -> CallId {
        let id = self.take_next_id();
        let call = Call::open_from(id, record);
        self.open_by_radio.entry(call.radio_id).or_default().push(id);
        self.call_order.push(id);
        self.calls.insert(id, call);
        self.counters.calls_opened += 1;
        id
    }

    /// Sets the emergency flag on an open call.
    pub fn set_emergency(&mut self, id: CallId, value: bool) -> Result<(), StoreError> {
        let call = self.calls.get_mut(&id).ok_or(StoreError::MissingCall(id))?;
        if call.phase == Phase::Closing {
            return Err(StoreError::CallClosing(id));
        }
        call.is_emergency = value;
        Ok(())
    }

    /// Opens a new session seeded with `call_id` and assigns the call to it.
    pub fn open_session(&mut self, call_id: CallId) -> Result<SessionId, StoreError> {
        let call = self
            .calls
            .get(&call_id)
            .ok_or(StoreError::MissingCall(call_id))?
            .clone();
        let id = self.take_next_id();
        self.sessions.insert(id, Session::open_from(id, &call));
        self.session_order.push(id);
        if let Some(call) = self.calls.get_mut(&call_id) {
            call.session_id = Some(id);
        }
        self.counters.sessions_opened += 1;
        Ok(id)
    }

    /// Admits `call_id` into an existing session and assigns it.
    pub fn admit_call(&mut self, session_id: SessionId, call_id: CallId) -> Result<(), StoreError> {
        let call = self
            .calls
            .get(&call_id)
            .ok_or(StoreError::MissingCall(call_id))?
            .clone();
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::MissingSession(session_id))?;
        session.admit(&call);
        if let Some(call) = self.calls.get_mut(&call_id) {
            call.session_id = Some(session_id);
        }
        Ok(())
    }

    /// Tracks an assigned call's extension inside its session.
    pub fn extend_session_member(
        &mut self,
        session_id: SessionId,
        call_id: CallId,
        end: Seconds,
    ) -> Result<(), StoreError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::MissingSession(session_id))?;
        session.extend_member(call_id, end);
        Ok(())
    }

    /// Borrows one live call.
    pub fn call(&self, id: CallId) -> Option<&Call> {
        self.calls.get(&id)
    }

    /// Clones one live call.
    pub fn call_cloned(&self, id: CallId) -> Option<Call> {
        self.call(id).cloned()
    }

    /// Borrows one live session.
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Clones one live session.
    pub fn session_cloned(&self, id: SessionId) -> Option<Session> {
        self.session(id).cloned()
    }

    /// Open calls in creation order.
    pub fn open_calls(&self) -> impl Iterator<Item = &Call> {
        self.call_order
            .iter()
            .filter_map(|id| self.calls.get(id))
            .filter(|call| call.phase == Phase::Open)
    }

    /// Closing calls in creation order.
    pub fn closing_calls(&self) -> impl Iterator<Item = &Call> {
        self.call_order
            .iter()
            .filter_map(|id| self.calls.get(id))
            .filter(|call| call.phase == Phase::Closing)
    }

    /// Open sessions in creation order.
    pub fn open_sessions(&self) -> impl Iterator<Item = &Session> {
        self.session_order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .filter(|session| session.phase == Phase::Open)
    }

    /// Closing sessions in creation order.
    pub fn closing_sessions(&self) -> impl Iterator<Item = &Session> {
        self.session_order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .filter(|session| session.phase == Phase::Closing)
    }

    /// Snapshot of every live call in creation order.
    pub fn live_calls(&self) -> Vec<Call> {
        self.call_order
            .iter()
            .filter_map(|id| self.calls.get(id).cloned())
            .collect()
    }

    /// Snapshot of every live session in creation order.
    pub fn live_sessions(&self) -> Vec<Session> {
        self.session_order
            .iter()
            .filter_map(|id| self.sessions.get(id).cloned())
            .collect()
    }

    /// Marks a call closing and drops it from the matching index, so later
    /// bursts open a new call instead of reviving this one.
    pub fn mark_call_closing(&mut self, id: CallId) -> Result<(), StoreError> {
        let call = self.calls.get_mut(&id).ok_or(StoreError::MissingCall(id))?;
        call.phase = Phase::Closing;
        let radio_id = call.radio_id;
        if let Some(ids) = self.open_by_radio.get_mut(&radio_id) {
            Self::remove_from_vec_index(ids, id);
            if ids.is_empty() {
                self.open_by_radio.remove(&radio_id);
            }
        }
        Ok(())
    }

    /// Marks a session closing; the aggregator no longer scores it.
    pub fn mark_session_closing(&mut self, id: SessionId) -> Result<(), StoreError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(StoreError::MissingSession(id))?;
        session.phase = Phase::Closing;
        Ok(())
    }

    /// Removes a call once its persistence is acknowledged.
    pub fn remove_call(&mut self, id: CallId) -> Option<Call> {
        let call = self.calls.remove(&id)?;
        Self::remove_from_vec_index(&mut self.call_order, id);
        if let Some(ids) = self.open_by_radio.get_mut(&call.radio_id) {
            Self::remove_from_vec_index(ids, id);
            if ids.is_empty() {
                self.open_by_radio.remove(&call.radio_id);
            }
        }
        self.counters.calls_closed += 1;
        Some(call)
    }

    /// Removes a session once its persistence is acknowledged.
    pub fn remove_session(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        Self::remove_from_vec_index(&mut self.session_order, id);
        self.counters.sessions_closed += 1;
        Some(session)
    }

    /// Last-seen time for one radio, if still tracked.
    pub fn sighting(&self, radio_id: RadioId) -> Option<Seconds> {
        self.sightings.get(&radio_id).copied()
    }

    /// Drops sightings older than `cutoff`.
    pub fn prune_sightings(&mut self, cutoff: Seconds) {
        self.sightings.retain(|_, seen| *seen >= cutoff);
    }

    /// Event counters.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Mutable event counters, for the engine passes that own this store.
    pub fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    /// Counters plus live-set gauges.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            counters: self.counters,
            live_calls: self.calls.len(),
            live_sessions: self.sessions.len(),
            tracked_radios: self.sightings.len(),
            last_burst_time: self.last_burst_time,
            next_id: self.next_id,
        }
    }

    fn take_next_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn remove_from_vec_index(v: &mut Vec<EntityId>, id: EntityId) {
        if let Some(pos) = v.iter().position(|x| *x == id) {
            v.remove(pos);
        }
    }
}
