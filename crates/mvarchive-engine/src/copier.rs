//! Page-at-a-time row transfer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::trace;

use mvarchive_core::{
    BatchWindow, DestinationStore, Error, ProjectKey, Result, RowBatch, SourceStore,
};

/// Copies one window of a project's rows from source to destination.
///
/// Not idempotent: re-running a window that already landed fails on the
/// destination's primary key.
pub struct BatchCopier {
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
    /// Destination column names per table, read once.
    destination_columns: RwLock<HashMap<String, Vec<String>>>,
}

impl BatchCopier {
    pub fn new(source: Arc<dyn SourceStore>, destination: Arc<dyn DestinationStore>) -> Self {
        Self {
            source,
            destination,
            destination_columns: RwLock::new(HashMap::new()),
        }
    }

    /// Copy the rows of `table` linked to `key` that fall inside `window`.
    ///
    /// Returns the number of rows written; 0 when the window lies past the
    /// end of the result set.
    pub async fn copy_batch(
        &self,
        table: &str,
        key: &ProjectKey,
        window: BatchWindow,
    ) -> Result<u64> {
        let start = Instant::now();
        let batch = self
            .source
            .fetch_linked_batch(table, key, window)
            .await
            .map_err(|e| e.into_copy(table))?;
        if batch.is_empty() {
            return Ok(0);
        }

        let written = self.insert_batch(table, &batch).await?;
        trace!(
            subsystem = "engine",
            component = "copier",
            op = "copy_batch",
            db_table = table,
            project = %key,
            offset = window.offset,
            rows = written,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch copied"
        );
        Ok(written)
    }

    /// Insert an already materialised batch, mapping columns by name.
    pub async fn insert_batch(&self, table: &str, batch: &RowBatch) -> Result<u64> {
        self.check_mapping(table, batch).await?;
        self.destination
            .bulk_insert(table, batch)
            .await
            .map_err(|e| e.into_copy(table))
    }

    /// Every batch column must exist on the destination table.
    async fn check_mapping(&self, table: &str, batch: &RowBatch) -> Result<()> {
        let known = self.destination_columns(table).await?;
        let missing: Vec<&str> = batch
            .columns
            .iter()
            .filter(|c| !known.contains(c))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::copy(
            table,
            format!(
                "destination table has no column(s) {}",
                missing.join(", ")
            ),
        ))
    }

    async fn destination_columns(&self, table: &str) -> Result<Vec<String>> {
        if let Some(columns) = self.destination_columns.read().await.get(table) {
            return Ok(columns.clone());
        }
        let columns = self
            .destination
            .table_column_names(table)
            .await
            .map_err(|e| e.into_copy(table))?;
        // An absent table is not cached; it may be created later in the run.
        if !columns.is_empty() {
            self.destination_columns
                .write()
                .await
                .insert(table.to_string(), columns.clone());
        }
        Ok(columns)
    }
}
