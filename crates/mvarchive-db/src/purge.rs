//! Destructive source cleanup.
//!
//! Kept apart from [`crate::PgSourceStore`] so that only a non-dry-run engine
//! is ever handed something that can delete.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use mvarchive_core::{
    defaults, quote_ident, Error, ProjectKey, Result, SourcePurge, LINK_COLUMN, PROJECTS_TABLE,
    PROJECT_KEY_COLUMN,
};

use crate::catalog;

/// PostgreSQL implementation of [`SourcePurge`].
pub struct PgSourcePurge {
    pool: PgPool,
    schema: String,
}

impl PgSourcePurge {
    pub fn new(pool: PgPool) -> Self {
        Self::with_schema(pool, defaults::SCHEMA)
    }

    pub fn with_schema(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    async fn delete_where(&self, table: &str, column: &str, key: &ProjectKey) -> Result<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE {}::text = $1",
            catalog::qualified(&self.schema, table),
            quote_ident(column),
        ))
        .bind(key.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::deletion(table, e))?;

        debug!(
            subsystem = "database",
            component = "purge",
            db_table = table,
            project = %key,
            rows = result.rows_affected(),
            "Deleted from source"
        );
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SourcePurge for PgSourcePurge {
    async fn delete_linked_rows(&self, table: &str, key: &ProjectKey) -> Result<u64> {
        self.delete_where(table, LINK_COLUMN, key).await
    }

    async fn delete_project_record(&self, key: &ProjectKey) -> Result<u64> {
        self.delete_where(PROJECTS_TABLE, PROJECT_KEY_COLUMN, key)
            .await
    }
}
