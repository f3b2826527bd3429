//! # mvarchive-db
//!
//! PostgreSQL layer for the project archive engine.
//!
//! This crate provides:
//! - Connection pool management for the source and destination databases
//! - Catalog introspection (column metadata, table existence)
//! - [`PgSourceStore`], [`PgDestinationStore`] and [`PgSourcePurge`], the
//!   PostgreSQL implementations of the core store traits
//!
//! ## Example
//!
//! ```rust,ignore
//! use mvarchive_db::{ArchiveDatabase, PoolConfig};
//!
//! let db = ArchiveDatabase::connect(&config, PoolConfig::default()).await?;
//! let keys = db.source.list_project_keys().await?;
//! ```

pub mod catalog;
pub mod destination;
pub mod pool;
pub mod purge;
pub mod source;

// Test fixtures for integration tests
// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::sync::Arc;

pub use destination::PgDestinationStore;
pub use pool::{connect_store, connect_store_lazy, create_pool_with_config, PoolConfig};
pub use purge::PgSourcePurge;
pub use source::PgSourceStore;

// Re-export core types
pub use mvarchive_core::*;

/// Both sides of an archive run, connected.
#[derive(Clone)]
pub struct ArchiveDatabase {
    /// Read access to the operational database.
    pub source: Arc<PgSourceStore>,
    /// Write access to the archive database.
    pub destination: Arc<PgDestinationStore>,
}

impl ArchiveDatabase {
    /// Open one pool per store. Fails with [`Error::Config`] before any I/O
    /// when the config is unusable, and with [`Error::Connection`] naming the
    /// store that could not be reached.
    pub async fn connect(config: &ArchiveConfig, pool_config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let source_pool = connect_store(config.source(), &pool_config).await?;
        let destination_pool = connect_store(config.destination(), &pool_config).await?;
        Ok(Self::new(source_pool, destination_pool))
    }

    /// Like [`ArchiveDatabase::connect`] but without touching the network.
    /// Connection failures surface on first use.
    pub fn connect_lazy(config: &ArchiveConfig, pool_config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let source_pool = connect_store_lazy(config.source(), &pool_config)?;
        let destination_pool = connect_store_lazy(config.destination(), &pool_config)?;
        Ok(Self::new(source_pool, destination_pool))
    }

    /// Wrap existing pools.
    pub fn new(source_pool: sqlx::PgPool, destination_pool: sqlx::PgPool) -> Self {
        Self {
            source: Arc::new(PgSourceStore::new(source_pool)),
            destination: Arc::new(PgDestinationStore::new(destination_pool)),
        }
    }

    /// Deletion handle over the source pool.
    ///
    /// Only a caller that has decided to clean the source asks for one.
    pub fn purger(&self) -> PgSourcePurge {
        PgSourcePurge::new(self.source.pool().clone())
    }

    /// Close both pools.
    pub async fn close(&self) {
        self.source.pool().close().await;
        self.destination.pool().close().await;
    }
}
