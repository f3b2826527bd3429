//! On-demand destination table creation.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use mvarchive_core::{create_table_statement, DestinationStore, Result, SourceStore};

/// Creates destination tables from source column metadata when absent.
pub struct SchemaReplicator {
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
}

impl SchemaReplicator {
    pub fn new(source: Arc<dyn SourceStore>, destination: Arc<dyn DestinationStore>) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Make sure `table` exists in the destination.
    ///
    /// Returns `true` when the table was created by this call. An existing
    /// table costs one catalog round trip and nothing else. Every failure is
    /// reported as [`mvarchive_core::Error::Schema`].
    pub async fn ensure_table(&self, table: &str) -> Result<bool> {
        let start = Instant::now();

        let exists = self
            .destination
            .table_exists(table)
            .await
            .map_err(|e| e.into_schema(table))?;
        if exists {
            debug!(
                subsystem = "engine",
                component = "replicator",
                db_table = table,
                "Destination table exists"
            );
            return Ok(false);
        }

        let columns = self
            .source
            .table_columns(table)
            .await
            .map_err(|e| e.into_schema(table))?;
        let statement = create_table_statement(self.destination.schema(), table, &columns)?;

        self.destination
            .execute_ddl(&statement)
            .await
            .map_err(|e| e.into_schema(table))?;

        info!(
            subsystem = "engine",
            component = "replicator",
            op = "create_table",
            db_table = table,
            columns = columns.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Destination table created"
        );
        Ok(true)
    }
}
