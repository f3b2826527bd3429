//! Write side of an archive run: the archive database.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::trace;

use mvarchive_core::{
    defaults, quote_ident, DestinationStore, Error, ProjectKey, Result, RowBatch,
    PROJECTS_TABLE, PROJECT_KEY_COLUMN,
};

use crate::catalog;

/// PostgreSQL implementation of [`DestinationStore`].
pub struct PgDestinationStore {
    pool: PgPool,
    schema: String,
}

impl PgDestinationStore {
    /// Create a new PgDestinationStore writing to the default schema.
    pub fn new(pool: PgPool) -> Self {
        Self::with_schema(pool, defaults::SCHEMA)
    }

    pub fn with_schema(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// `INSERT ... SELECT` over `jsonb_populate_recordset`, mapping each listed
/// column by name. Binary columns arrive as hex text and are parsed back by
/// the column type's input function.
fn bulk_insert_sql(qualified_table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({cols}) \
         SELECT {cols} FROM jsonb_populate_recordset(NULL::{table}, $1)",
        table = qualified_table,
        cols = column_list,
    )
}

#[async_trait]
impl DestinationStore for PgDestinationStore {
    fn schema(&self) -> &str {
        &self.schema
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn project_exists(&self, key: &ProjectKey) -> Result<bool> {
        if !catalog::table_exists(&self.pool, &self.schema, PROJECTS_TABLE).await? {
            return Ok(false);
        }

        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {}::text = $1)",
            catalog::qualified(&self.schema, PROJECTS_TABLE),
            quote_ident(PROJECT_KEY_COLUMN),
        ))
        .bind(key.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        catalog::table_exists(&self.pool, &self.schema, table).await
    }

    async fn table_column_names(&self, table: &str) -> Result<Vec<String>> {
        catalog::column_names(&self.pool, &self.schema, table).await
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        sqlx::query(statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn bulk_insert(&self, table: &str, batch: &RowBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let sql = bulk_insert_sql(&catalog::qualified(&self.schema, table), &batch.columns);
        let payload = JsonValue::Array(
            batch
                .rows
                .iter()
                .cloned()
                .map(JsonValue::Object)
                .collect(),
        );

        let result = sqlx::query(&sql)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::copy(table, e))?;

        trace!(
            subsystem = "database",
            component = "destination",
            op = "bulk_insert",
            db_table = table,
            rows = result.rows_affected(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch inserted"
        );
        Ok(result.rows_affected())
    }
}
