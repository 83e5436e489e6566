use serde::{Deserialize, Serialize};

use crate::{
    burst::DropReason,
    types::{EntityId, Seconds},
};

/// Monotonic event counters kept by the live store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    /// Speech bursts accepted into clustering.
    pub bursts_accepted: u64,
    /// Data bursts counted and skipped.
    pub bursts_data: u64,
    /// Records dropped for malformed fields.
    pub bursts_malformed: u64,
    /// Records ignored for reserved radio identities.
    pub bursts_reserved: u64,
    /// Calls opened.
    pub calls_opened: u64,
    /// Calls removed after durable persistence.
    pub calls_closed: u64,
    /// Sessions opened.
    pub sessions_opened: u64,
    /// Sessions removed after durable persistence.
    pub sessions_closed: u64,
    /// Sweep passes run.
    pub sweeps: u64,
    /// Archive batches that failed and were left for retry.
    pub persist_failures: u64,
}

impl Counters {
    /// Records one screened-out burst.
    pub fn note_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::DataKind => self.bursts_data += 1,
            DropReason::BadTimestamp | DropReason::BadMarker => self.bursts_malformed += 1,
            DropReason::ReservedRadio => self.bursts_reserved += 1,
        }
    }
}

/// Point-in-time view of the live store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Event counters since start.
    pub counters: Counters,
    /// Calls currently live, open or closing.
    pub live_calls: usize,
    /// Sessions currently live.
    pub live_sessions: usize,
    /// Radios with an unpruned sighting.
    pub tracked_radios: usize,
    /// Highest accepted burst timestamp.
    pub last_burst_time: Seconds,
    /// Next id the shared counter will hand out.
    pub next_id: EntityId,
}
