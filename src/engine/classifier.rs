use tracing::debug;

use crate::{
    burst::{BurstRecord, DropReason},
    config::ClusterConfig,
    core::store::LiveStore,
    types::CallId,
};

/// What the classifier did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyOutcome {
    /// No open call matched; a new one was opened.
    Created(CallId),
    /// An open call absorbed the record.
    Extended(CallId),
    /// The record was screened out.
    Dropped(DropReason),
}

/// Routes one record to an open call or opens a new one.
///
/// Screening happens first: data frames, malformed fields, and reserved
/// radio identities never touch the live set. Accepted records advance the
/// engine clock and the radio sighting map, then the first open call on the
/// record's radio within marker tolerance wins; there is no best-match
/// search. The emergency flag rides along on the matched or created call.
pub fn classify(
    store: &mut LiveStore,
    record: &BurstRecord,
    config: &ClusterConfig,
) -> ClassifyOutcome {
    if let Err(reason) = record.screen(config) {
        store.counters_mut().note_drop(reason);
        debug!(
            radio = record.radio_id,
            marker = record.usage_marker,
            ?reason,
            "burst screened out"
        );
        return ClassifyOutcome::Dropped(reason);
    }

    store.observe(record);
    store.counters_mut().bursts_accepted += 1;

    match store.match_burst(record, config.marker_tolerance) {
        Some(id) => ClassifyOutcome::Extended(id),
        None => {
            let id = store.open_call(record);
            debug!(call = id, radio = record.radio_id, "call opened");
            ClassifyOutcome::Created(id)
        }
    }
}
