//! Clustering thresholds and reserved identities.

use serde::{Deserialize, Serialize};

use crate::types::{RADIO_BROADCAST, RADIO_NONE, RadioId, Seconds};

/// Thresholds driving call matching, session scoring, and expiry.
///
/// The defaults reproduce the windows the engine was tuned with: a call dies
/// after 3 s of silence, a session after 20 s, and a burst joins an open
/// call when its marker sits within 6 of the one the call opened with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Idle seconds after which an open call is closed.
    pub call_separation_secs: Seconds,
    /// Idle seconds after which an open session is closed; also the
    /// denominator of the session affinity score.
    pub session_separation_secs: Seconds,
    /// Maximum usage-marker distance treated as the same transmission.
    pub marker_tolerance: u8,
    /// Idle seconds after which a radio sighting is pruned from memory.
    pub radio_timeout_secs: Seconds,
    /// Identities never clustered: the "no radio" placeholder and
    /// broadcast/control addresses.
    pub reserved_radios: Vec<RadioId>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            call_separation_secs: 3.0,
            session_separation_secs: 20.0,
            marker_tolerance: 6,
            radio_timeout_secs: 300.0,
            reserved_radios: vec![RADIO_NONE, RADIO_BROADCAST],
        }
    }
}
