//! Clustering engine over the live store.

/// Session placement and affinity scoring.
pub mod aggregator;
/// Burst-to-call matching.
pub mod classifier;
/// Expiry passes and gateway hand-off.
pub mod sweeper;
