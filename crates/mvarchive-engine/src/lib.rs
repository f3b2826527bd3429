//! # mvarchive-engine
//!
//! Archive orchestration for project data.
//!
//! This crate provides:
//! - [`SchemaReplicator`]: creates destination tables from source metadata
//! - [`BatchCopier`]: moves one window of rows at a time
//! - [`TableArchiver`] and [`ProjectArchiver`]: one table, one project
//! - [`BulkOrchestrator`]: every project, best-effort
//! - Progress snapshots over a channel and cooperative cancellation
//!
//! ## Example
//!
//! ```ignore
//! use mvarchive_engine::{Archiver, ProgressSink};
//!
//! let archiver = Archiver::builder(source, destination)
//!     .with_config(&config)
//!     .build()?;
//!
//! let (sink, mut rx) = ProgressSink::channel();
//! tokio::spawn(async move {
//!     while let Some(progress) = rx.recv().await {
//!         println!("{}: {}", progress.current_table, progress.status);
//!     }
//! });
//!
//! let done = archiver.archive_project("P-100", &sink).await?;
//! ```

pub mod archiver;
pub mod bulk;
pub mod copier;
pub mod progress;
pub mod project;
pub mod replicator;
pub mod table;

// Always compiled so integration tests (in tests/) and dry simulations can
// use the in-memory store.
pub mod test_fixtures;

pub use archiver::{Archiver, ArchiverBuilder, ConnectionReport};
pub use bulk::BulkOrchestrator;
pub use copier::BatchCopier;
pub use progress::{Interrupted, ProgressSink};
pub use project::{ProjectArchiver, ProjectOutcome, SourceCleanup};
pub use replicator::SchemaReplicator;
pub use table::TableArchiver;

pub use tokio_util::sync::CancellationToken;

/// Tables touched per project: the root record plus every dependent table.
pub const TABLES_PER_PROJECT: u64 = mvarchive_core::PROJECT_TABLES.len() as u64 + 1;
