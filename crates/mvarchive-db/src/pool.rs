//! Database connection pool management.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use mvarchive_core::{defaults, Error, Result, StoreConfig};

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Idle connection timeout duration.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::POOL_MAX_CONNECTIONS,
            min_connections: 1,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Open a pool for one side of an archive run.
///
/// Any failure to reach the server is reported as [`Error::Connection`]
/// naming the store, never as a generic database error.
pub async fn connect_store(store: StoreConfig<'_>, config: &PoolConfig) -> Result<PgPool> {
    let url = store.connection_url()?;
    create_pool_with_config(store.label, &url, config).await
}

/// Build a pool that connects on first use.
///
/// Only a malformed URL fails here; reachability surfaces on the first
/// query, which lets a caller probe each store separately.
pub fn connect_store_lazy(store: StoreConfig<'_>, config: &PoolConfig) -> Result<PgPool> {
    let url = store.connection_url()?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(0)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .connect_lazy(&url)
        .map_err(|e| Error::Config(format!("{} connection settings rejected: {e}", store.label)))
}

/// Create a new PostgreSQL connection pool with custom configuration.
pub async fn create_pool_with_config(
    label: &str,
    database_url: &str,
    config: &PoolConfig,
) -> Result<PgPool> {
    let start = Instant::now();

    debug!(
        subsystem = "database",
        component = "pool",
        op = "create",
        store = label,
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        "Creating database connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(|e| {
            warn!(
                subsystem = "database",
                component = "pool",
                store = label,
                error = %e,
                "Failed to connect"
            );
            Error::Connection(format!("{label} database unreachable: {e}"))
        })?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "established",
        store = label,
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_is_small() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, defaults::POOL_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, 1);
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .max_connections(8)
            .min_connections(2)
            .connect_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(60));

        assert_eq!(config.max_connections, 8);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_invalid_store_config_fails_before_connecting() {
        let config = mvarchive_core::ArchiveConfig::default();
        let err = connect_store(config.source(), &PoolConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
