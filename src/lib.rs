//! Real-time clustering of decoded channel-activity bursts into calls and
//! sessions, with SQLite archiving of expired entities.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::LiveStore`]:
//! ```
//! use burstlog::{
//!     burst::{BurstKind, BurstRecord},
//!     config::ClusterConfig,
//!     core::store::LiveStore,
//!     engine::classifier::{self, ClassifyOutcome},
//! };
//!
//! let mut store = LiveStore::new();
//! let config = ClusterConfig::default();
//! let record = BurstRecord {
//!     radio_id: 0x2001,
//!     usage_marker: 12,
//!     timestamp: 0.0,
//!     emergency: false,
//!     kind: BurstKind::Speech,
//! };
//! let outcome = classifier::classify(&mut store, &record, &config);
//! assert_eq!(outcome, ClassifyOutcome::Created(1));
//! ```
//!
//! Runtime usage with SQLite archive:
//! ```no_run
//! use burstlog::{
//!     burst::{BurstKind, BurstRecord},
//!     core::store::LiveStore,
//!     persist::{ArchiveSink, sqlite::SqliteArchive},
//!     runtime::handle::{RuntimeConfig, spawn_burstlog},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut sink = SqliteArchive::open("burstlog.db").expect("open sqlite");
//! let first_id = sink.allocate_next_id().expect("allocate id");
//! let store = LiveStore::with_first_id(first_id);
//! let handle = spawn_burstlog(store, Some(Box::new(sink)), RuntimeConfig::default());
//! handle
//!     .ingest(BurstRecord {
//!         radio_id: 0x2001,
//!         usage_marker: 12,
//!         timestamp: 0.0,
//!         emergency: false,
//!         kind: BurstKind::Speech,
//!     })
//!     .await
//!     .expect("ingest");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Burst record model and admission screening.
pub mod burst;
/// Call entity and burst matching.
pub mod call;
/// Clustering thresholds.
pub mod config;
/// Live entity store and counters.
pub mod core;
/// Classification, session placement, and expiry sweeping.
pub mod engine;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Session entity and placement scoring.
pub mod session;
/// Shared primitive types and enums.
pub mod types;
