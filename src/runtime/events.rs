//! Engine event stream payloads.

use crate::types::{CallId, RadioId, SessionId};

/// Events emitted from the single-writer engine loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A burst opened a new call.
    CallOpened {
        /// New call id.
        id: CallId,
        /// Radio the call belongs to.
        radio_id: RadioId,
    },
    /// A burst matched an open call.
    CallExtended {
        /// Extended call id.
        id: CallId,
    },
    /// A call was placed in a session.
    CallAssigned {
        /// Placed call.
        call: CallId,
        /// Session it joined.
        session: SessionId,
    },
    /// A session was opened.
    SessionOpened {
        /// New session id.
        id: SessionId,
    },
    /// A call was archived and left the live set.
    CallClosed {
        /// Closed call id.
        id: CallId,
    },
    /// A session was archived and left the live set.
    SessionClosed {
        /// Closed session id.
        id: SessionId,
    },
    /// A sweep pass finished.
    SweepCompleted {
        /// Calls expired by the pass.
        expired_calls: usize,
        /// Sessions expired by the pass.
        expired_sessions: usize,
    },
}
