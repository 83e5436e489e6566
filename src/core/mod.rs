//! In-memory live working set and statistics.

/// Aggregate counters and point-in-time gauges.
pub mod stats;
/// Authoritative live call/session store.
pub mod store;
