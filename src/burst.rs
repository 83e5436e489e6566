//! Burst records delivered by the upstream decoder.

use serde::{Deserialize, Serialize};

use crate::{
    config::ClusterConfig,
    types::{RadioId, Seconds, USAGE_MARKER_MAX, UsageMarker},
};

/// Frame class of one decoded burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BurstKind {
    /// Traffic-channel speech frame; participates in clustering.
    Speech,
    /// Raw data frame; counted but never clustered.
    Data,
}

/// One decoded channel-activity record.
///
/// The upstream listener parses wire frames into this shape; the engine has
/// no opinion on transport framing or encoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BurstRecord {
    /// Transmitting radio identity.
    pub radio_id: RadioId,
    /// Rolling traffic-usage counter, valid range 0..=63.
    pub usage_marker: UsageMarker,
    /// Capture time in seconds, monotonic within a run.
    pub timestamp: Seconds,
    /// Pre-emption priority flag decoded from the frame.
    pub emergency: bool,
    /// Frame class.
    pub kind: BurstKind,
}

/// Why a record was screened out before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Raw data frame.
    DataKind,
    /// Timestamp is non-finite or negative.
    BadTimestamp,
    /// Usage marker above the six-bit range.
    BadMarker,
    /// Radio identity is reserved (placeholder or broadcast/control).
    ReservedRadio,
}

impl BurstRecord {
    /// Screens this record against `config` before classification.
    pub fn screen(&self, config: &ClusterConfig) -> Result<(), DropReason> {
        if self.kind == BurstKind::Data {
            return Err(DropReason::DataKind);
        }
        if !self.timestamp.is_finite() || self.timestamp < 0.0 {
            return Err(DropReason::BadTimestamp);
        }
        if self.usage_marker > USAGE_MARKER_MAX {
            return Err(DropReason::BadMarker);
        }
        if config.reserved_radios.contains(&self.radio_id) {
            return Err(DropReason::ReservedRadio);
        }
        Ok(())
    }
}
