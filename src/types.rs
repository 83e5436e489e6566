//! Shared primitive identifiers, lifecycle phases, and protocol constants.

use serde::{Deserialize, Serialize};

/// Monotonic identifier shared by calls and sessions.
pub type EntityId = u64;
/// Call identifier, allocated from the shared entity counter.
pub type CallId = EntityId;
/// Session identifier, allocated from the shared entity counter.
pub type SessionId = EntityId;
/// Subscriber identity of a transmitting radio.
pub type RadioId = u32;
/// Rolling traffic-usage counter carried by each burst.
pub type UsageMarker = u8;
/// Timestamps and durations in seconds.
pub type Seconds = f64;

/// Highest encodable usage marker; the protocol allots six bits.
pub const USAGE_MARKER_MAX: UsageMarker = 63;

/// Placeholder identity meaning "no radio".
pub const RADIO_NONE: RadioId = 0;

/// Broadcast/control identity.
pub const RADIO_BROADCAST: RadioId = 0xFF_FFFF;

/// Live-set lifecycle phase.
///
/// Removal is the closed state; a removed entity never reappears, so a burst
/// that would have matched a closing call opens a new one instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Accepting updates.
    Open,
    /// Expired; persistence in flight or pending retry.
    Closing,
}
