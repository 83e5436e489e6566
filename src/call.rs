//! Call records reconstructed from burst activity.

use serde::{Deserialize, Serialize};

use crate::{
    burst::BurstRecord,
    types::{CallId, Phase, RadioId, Seconds, SessionId, UsageMarker},
};

/// One radio's continuous transmission, bounded by inactivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Stable identifier from the shared entity counter.
    pub id: CallId,
    /// Transmitting radio.
    pub radio_id: RadioId,
    /// Usage marker carried by the burst that opened the call.
    pub usage_marker: UsageMarker,
    /// First burst time.
    pub start_time: Seconds,
    /// Latest burst time; non-decreasing while open.
    pub end_time: Seconds,
    /// Sticky pre-emption flag.
    pub is_emergency: bool,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Owning session, assigned by the aggregator.
    pub session_id: Option<SessionId>,
}

impl Call {
    /// Builds a fresh call around the record that opened it.
    pub fn open_from(id: CallId, record: &BurstRecord) -> Self {
        Self {
            id,
            radio_id: record.radio_id,
            usage_marker: record.usage_marker,
            start_time: record.timestamp,
            end_time: record.timestamp,
            is_emergency: record.emergency,
            phase: Phase::Open,
            session_id: None,
        }
    }

    /// True when `record` continues this call: still open, same radio, and
    /// the marker within `tolerance` of the one the call opened with.
    pub fn matches(&self, record: &BurstRecord, tolerance: u8) -> bool {
        self.phase == Phase::Open
            && self.radio_id == record.radio_id
            && self.usage_marker.abs_diff(record.usage_marker) <= tolerance
    }

    /// Absorbs `record`: extends the end time and latches the emergency
    /// flag. The marker set at creation is never revised.
    pub fn extend(&mut self, record: &BurstRecord) {
        self.end_time = self.end_time.max(record.timestamp);
        if record.emergency {
            self.is_emergency = true;
        }
    }
}
