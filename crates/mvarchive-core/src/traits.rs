//! Store traits for the archive engine.
//!
//! The relational-store contract is split by capability. Reading the source
//! and writing the destination are always available; deleting from the
//! source lives on its own trait so a dry-run engine can be built without
//! ever holding a handle that deletes.

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use crate::defaults;
use crate::error::Result;
use crate::models::{BatchWindow, ColumnDefinition, ProjectKey, RowBatch};

/// Read-only access to the operational database.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Every project key, in a stable order.
    async fn list_project_keys(&self) -> Result<Vec<String>>;

    /// The project's root record, all columns.
    async fn fetch_project_record(&self, key: &ProjectKey)
        -> Result<Option<Map<String, JsonValue>>>;

    /// Rows in `table` linked to the project.
    async fn count_linked_rows(&self, table: &str, key: &ProjectKey) -> Result<u64>;

    /// Column metadata ordered by position; empty when the table is missing.
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnDefinition>>;

    /// One page of linked rows, ordered deterministically by primary key.
    async fn fetch_linked_batch(
        &self,
        table: &str,
        key: &ProjectKey,
        window: BatchWindow,
    ) -> Result<RowBatch>;
}

/// Access to the archive database.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Schema that created tables are qualified with.
    fn schema(&self) -> &str {
        defaults::SCHEMA
    }

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Whether a project with this key has already been archived.
    async fn project_exists(&self, key: &ProjectKey) -> Result<bool>;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Column names of an existing table.
    async fn table_column_names(&self, table: &str) -> Result<Vec<String>>;

    /// Run a data-definition statement.
    async fn execute_ddl(&self, statement: &str) -> Result<()>;

    /// Insert every row of `batch` into `table`, mapping columns by name.
    /// Returns the number of rows written.
    async fn bulk_insert(&self, table: &str, batch: &RowBatch) -> Result<u64>;
}

/// Destructive source cleanup.
#[async_trait]
pub trait SourcePurge: Send + Sync {
    /// Delete rows in `table` linked to the project. Returns rows removed.
    async fn delete_linked_rows(&self, table: &str, key: &ProjectKey) -> Result<u64>;

    /// Delete the project's root record.
    async fn delete_project_record(&self, key: &ProjectKey) -> Result<u64>;
}
