use hashbrown::HashSet;
use tracing::{debug, warn};

use crate::{
    config::ClusterConfig,
    core::store::LiveStore,
    persist::{PersistError, SweepBatch},
    types::{CallId, EntityId, SessionId},
};

use super::aggregator;

/// The gateway's verdict for one offered batch.
#[derive(Debug)]
pub struct SweepAck {
    /// Call ids the batch carried.
    pub calls: Vec<CallId>,
    /// Session ids the batch carried.
    pub sessions: Vec<SessionId>,
    /// Whether the batch landed durably.
    pub result: Result<(), PersistError>,
}

impl SweepAck {
    /// Immediate success, used when no gateway is configured.
    pub fn success(batch: &SweepBatch) -> Self {
        Self {
            calls: batch.call_ids(),
            sessions: batch.session_ids(),
            result: Ok(()),
        }
    }
}

/// Result of one sweep pass.
#[derive(Debug)]
pub struct SweepOutcome {
    /// Calls newly expired by this pass.
    pub expired_calls: usize,
    /// Sessions newly expired by this pass.
    pub expired_sessions: usize,
    /// Everything closing and not already offered to the gateway.
    pub batch: SweepBatch,
}

/// Expires idle entities and tracks what is in flight to the gateway.
#[derive(Debug, Default)]
pub struct Sweeper {
    in_flight: HashSet<EntityId>,
}

impl Sweeper {
    /// New sweeper with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// One pass over the live sets.
    ///
    /// Scanning and marking are separate phases: expiry is decided on a
    /// snapshot of ids, then applied, so no scan ever observes a set mutated
    /// under it. An unassigned call is placed in a session before it closes.
    /// Idle time is measured against the engine clock, never wall clock.
    /// `force` expires every open entity regardless of idle time, for
    /// shutdown drains.
    pub fn plan(
        &mut self,
        store: &mut LiveStore,
        config: &ClusterConfig,
        force: bool,
    ) -> SweepOutcome {
        let now = store.last_burst_time();

        let expired_calls: Vec<CallId> = store
            .open_calls()
            .filter(|call| force || now - call.end_time > config.call_separation_secs)
            .map(|call| call.id)
            .collect();
        for id in &expired_calls {
            if store.call(*id).is_some_and(|call| call.session_id.is_none()) {
                if let Err(err) = aggregator::attach_call(store, *id, config) {
                    debug!(call = *id, error = ?err, "pre-close placement failed");
                }
            }
            if let Err(err) = store.mark_call_closing(*id) {
                debug!(call = *id, error = ?err, "closing mark missed");
            }
        }

        let expired_sessions: Vec<SessionId> = store
            .open_sessions()
            .filter(|session| force || now - session.end_time > config.session_separation_secs)
            .map(|session| session.id)
            .collect();
        for id in &expired_sessions {
            if let Err(err) = store.mark_session_closing(*id) {
                debug!(session = *id, error = ?err, "closing mark missed");
            }
        }

        store.prune_sightings(now - config.radio_timeout_secs);
        store.counters_mut().sweeps += 1;

        if !expired_calls.is_empty() || !expired_sessions.is_empty() {
            debug!(
                calls = expired_calls.len(),
                sessions = expired_sessions.len(),
                "sweep expired entities"
            );
        }

        let batch = self.collect_batch(store);
        SweepOutcome {
            expired_calls: expired_calls.len(),
            expired_sessions: expired_sessions.len(),
            batch,
        }
    }

    /// Applies the gateway's verdict for an offered batch.
    ///
    /// Success removes the batch's entities from the live set and returns
    /// their ids; failure leaves them closing so the next pass re-offers
    /// them, rather than requeueing behind a new separation window.
    pub fn acknowledge(
        &mut self,
        store: &mut LiveStore,
        ack: SweepAck,
    ) -> Result<(Vec<CallId>, Vec<SessionId>), PersistError> {
        for id in ack.calls.iter().chain(&ack.sessions) {
            self.in_flight.remove(id);
        }
        match ack.result {
            Ok(()) => {
                for id in &ack.calls {
                    store.remove_call(*id);
                }
                for id in &ack.sessions {
                    store.remove_session(*id);
                }
                Ok((ack.calls, ack.sessions))
            }
            Err(err) => {
                store.counters_mut().persist_failures += 1;
                warn!(
                    calls = ack.calls.len(),
                    sessions = ack.sessions.len(),
                    error = ?err,
                    "archive batch failed; entities kept for retry"
                );
                Err(err)
            }
        }
    }

    /// Forgets in-flight marks for a batch that never reached the worker.
    pub fn release(&mut self, calls: &[CallId], sessions: &[SessionId]) {
        for id in calls.iter().chain(sessions) {
            self.in_flight.remove(id);
        }
    }

    fn collect_batch(&mut self, store: &LiveStore) -> SweepBatch {
        let mut batch = SweepBatch::default();
        for call in store.closing_calls() {
            if self.in_flight.insert(call.id) {
                // The sighting can be gone if the call sat in retry past the
                // radio timeout; its own end time is still a sighting.
                let seen = store.sighting(call.radio_id).unwrap_or(call.end_time);
                batch.sightings.push((call.radio_id, seen));
                batch.calls.push(call.clone());
            }
        }
        for session in store.closing_sessions() {
            if self.in_flight.insert(session.id) {
                batch.sessions.push(session.clone());
            }
        }
        batch
    }
}
