//! Read side of an archive run: the operational database.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use mvarchive_core::{
    defaults, quote_ident, BatchWindow, ColumnDefinition, Error, ProjectKey, Result, RowBatch,
    SourceStore, LINK_COLUMN, PROJECTS_TABLE, PROJECT_KEY_COLUMN,
};

use crate::catalog;

/// PostgreSQL implementation of [`SourceStore`].
pub struct PgSourceStore {
    pool: PgPool,
    schema: String,
    /// ORDER BY clause per table, resolved once from the catalog.
    order_by: RwLock<HashMap<String, String>>,
}

impl PgSourceStore {
    /// Create a new PgSourceStore reading from the default schema.
    pub fn new(pool: PgPool) -> Self {
        Self::with_schema(pool, defaults::SCHEMA)
    }

    pub fn with_schema(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
            order_by: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Deterministic ordering for batch scans: the primary key, else the
    /// `ID` column, else every column that has an ordering.
    async fn order_clause(&self, table: &str) -> Result<String> {
        if let Some(clause) = self.order_by.read().await.get(table) {
            return Ok(clause.clone());
        }

        let columns = catalog::table_columns(&self.pool, &self.schema, table).await?;
        let clause = order_clause_for(table, &columns)?;
        debug!(
            subsystem = "database",
            component = "source",
            db_table = table,
            order_by = %clause,
            "Resolved batch ordering"
        );

        self.order_by
            .write()
            .await
            .insert(table.to_string(), clause.clone());
        Ok(clause)
    }
}

/// Types without a default btree ordering; `ORDER BY` on them fails.
const UNORDERABLE_TYPES: &[&str] = &[
    "json", "xml", "point", "line", "lseg", "box", "path", "polygon", "circle",
];

fn is_orderable(column: &ColumnDefinition) -> bool {
    let element = if column.data_type == "ARRAY" {
        column.udt_name.trim_start_matches('_')
    } else {
        column.data_type.as_str()
    };
    !UNORDERABLE_TYPES.contains(&element)
}

fn order_clause_for(table: &str, columns: &[ColumnDefinition]) -> Result<String> {
    let key: Vec<String> = columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| quote_ident(&c.name))
        .collect();
    if !key.is_empty() {
        return Ok(key.join(", "));
    }
    if columns.is_empty()
        || columns
            .iter()
            .any(|c| c.name == defaults::FALLBACK_ORDER_COLUMN)
    {
        return Ok(quote_ident(defaults::FALLBACK_ORDER_COLUMN));
    }

    let orderable: Vec<String> = columns
        .iter()
        .filter(|c| is_orderable(c))
        .map(|c| quote_ident(&c.name))
        .collect();
    if orderable.is_empty() {
        return Err(Error::copy(
            table,
            "no primary key, no ID column and no orderable column to page by",
        ));
    }
    Ok(orderable.join(", "))
}

fn into_object(value: JsonValue) -> Result<Map<String, JsonValue>> {
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(Error::InvalidArgument(format!(
            "expected a row object, got {other}"
        ))),
    }
}

#[async_trait]
impl SourceStore for PgSourceStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_project_keys(&self) -> Result<Vec<String>> {
        let start = Instant::now();
        let keys: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT {key}::text FROM {table} WHERE {key} IS NOT NULL ORDER BY 1",
            key = quote_ident(PROJECT_KEY_COLUMN),
            table = catalog::qualified(&self.schema, PROJECTS_TABLE),
        ))
        .fetch_all(&self.pool)
        .await?;

        debug!(
            subsystem = "database",
            component = "source",
            op = "list_project_keys",
            result_count = keys.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Project keys retrieved"
        );
        Ok(keys)
    }

    async fn fetch_project_record(
        &self,
        key: &ProjectKey,
    ) -> Result<Option<Map<String, JsonValue>>> {
        let row: Option<JsonValue> = sqlx::query_scalar(&format!(
            "SELECT to_jsonb(p) FROM {table} p WHERE p.{key}::text = $1 LIMIT 1",
            table = catalog::qualified(&self.schema, PROJECTS_TABLE),
            key = quote_ident(PROJECT_KEY_COLUMN),
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_object).transpose()
    }

    async fn count_linked_rows(&self, table: &str, key: &ProjectKey) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE {}::text = $1",
            catalog::qualified(&self.schema, table),
            quote_ident(LINK_COLUMN),
        ))
        .bind(key.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnDefinition>> {
        catalog::table_columns(&self.pool, &self.schema, table).await
    }

    async fn fetch_linked_batch(
        &self,
        table: &str,
        key: &ProjectKey,
        window: BatchWindow,
    ) -> Result<RowBatch> {
        let order_by = self.order_clause(table).await?;
        let start = Instant::now();

        let rows = sqlx::query(&format!(
            r#"
            SELECT to_jsonb(t) AS row
            FROM (
                SELECT * FROM {table}
                WHERE {link}::text = $1
                ORDER BY {order_by}
                OFFSET $2 ROWS
                FETCH NEXT $3 ROWS ONLY
            ) t
            "#,
            table = catalog::qualified(&self.schema, table),
            link = quote_ident(LINK_COLUMN),
        ))
        .bind(key.as_str())
        .bind(window.offset as i64)
        .bind(window.size as i64)
        .fetch_all(&self.pool)
        .await?;

        let objects = rows
            .into_iter()
            .map(|row| into_object(row.try_get::<JsonValue, _>("row")?))
            .collect::<Result<Vec<_>>>()?;

        trace!(
            subsystem = "database",
            component = "source",
            op = "fetch_batch",
            db_table = table,
            offset = window.offset,
            rows = objects.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch fetched"
        );
        Ok(RowBatch::from_rows(objects))
    }
}
