//! Scorecard Sync Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental synchronization of the College Scorecard `schools` dataset
//! into a local JSON snapshot.
//!
//! # Pipeline
//!
//! - [`paginator`]: sequential page cursor with total-count/empty-page termination
//! - [`retry`]: bounded retries with rate-limit-aware backoff
//! - [`normalizer`]: raw record → flat [`record::CanonicalRecord`]
//! - [`merge`]: delta merge against the previous snapshot
//! - [`store`]: whole-file snapshot and checkpoint persistence
//! - [`engine`]: the run loop tying it together
//!
//! # Example
//!
//! ```no_run
//! use scorecard_sync::client::{ScorecardClient, SchoolQuery, DEFAULT_BASE_URL};
//! use scorecard_sync::engine::{EngineOptions, SyncEngine};
//! use scorecard_sync::normalizer::Normalizer;
//! use scorecard_sync::store::{CheckpointStore, SnapshotStore};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let query = SchoolQuery {
//!         api_key: std::env::var("COLLEGE_SCORECARD_API_KEY")?,
//!         fields: Normalizer::scorecard().remote_fields(),
//!         filter: None,
//!     };
//!     let client = ScorecardClient::new(DEFAULT_BASE_URL, query, Duration::from_secs(30))?;
//!
//!     let engine = SyncEngine::new(
//!         client,
//!         SnapshotStore::new("data/filtered_data.json"),
//!         CheckpointStore::new("data/.sync-checkpoint.json"),
//!         EngineOptions::default(),
//!     );
//!     let report = engine.run().await?;
//!     println!("{} records", report.snapshot_records);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod merge;
pub mod normalizer;
pub mod paginator;
pub mod record;
pub mod retry;
pub mod store;

// Re-export commonly used types
pub use config::{Cli, SyncConfig};
pub use engine::{SyncEngine, SyncReport, SyncStatus};
pub use record::{CanonicalRecord, RecordId, Snapshot};
pub use scorecard_common::{Result, SyncError};
