use tracing::debug;

use crate::{
    call::Call,
    config::ClusterConfig,
    core::store::{LiveStore, StoreError},
    types::{CallId, Seconds, SessionId},
};

/// Where the aggregator put a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    /// The call was already a member; its span and session window grew.
    Extended(SessionId),
    /// The call joined the best-scoring open session.
    Joined(SessionId),
    /// No session qualified; a new one was opened around the call.
    Opened(SessionId),
}

/// Places a call in a session.
///
/// An assigned call only has its member span and session window extended;
/// membership never migrates. An unassigned call is scored against every
/// open session in creation order and joins the strictly-positive maximum,
/// first-created winning ties. With no eligible session a fresh one is
/// opened around the call.
pub fn attach_call(
    store: &mut LiveStore,
    id: CallId,
    config: &ClusterConfig,
) -> Result<Attach, StoreError> {
    let call = store.call(id).ok_or(StoreError::MissingCall(id))?.clone();

    if let Some(session_id) = call.session_id {
        store.extend_session_member(session_id, id, call.end_time)?;
        return Ok(Attach::Extended(session_id));
    }

    match best_session(store, &call, config.session_separation_secs) {
        Some(session_id) => {
            store.admit_call(session_id, id)?;
            Ok(Attach::Joined(session_id))
        }
        None => {
            let session_id = store.open_session(id)?;
            debug!(session = session_id, call = id, "session opened");
            Ok(Attach::Opened(session_id))
        }
    }
}

/// Highest-scoring compatible open session, first-created on ties.
fn best_session(store: &LiveStore, call: &Call, separation_secs: Seconds) -> Option<SessionId> {
    let mut best: Option<(SessionId, f64)> = None;
    for session in store.open_sessions() {
        let Some(score) = session.score(call, separation_secs) else {
            continue;
        };
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((session.id, score));
        }
    }
    best.map(|(id, _)| id)
}
