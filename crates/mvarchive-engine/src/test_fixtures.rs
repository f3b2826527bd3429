//! In-memory store for tests and dry simulations.
//!
//! [`MemoryStore`] implements all three store traits over a map of tables.
//! Use one instance as the source and another as the destination. Every call
//! is recorded as a [`StoreOp`] so tests can assert exactly what was read,
//! written and deleted.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mvarchive_engine::test_fixtures::MemoryStore;
//!
//! let source = MemoryStore::builder()
//!     .with_project("P-100", &[("Locations", 2), ("CutPartsFiles", 3500)])
//!     .build();
//! let destination = MemoryStore::builder().build();
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use tokio::sync::Mutex;

use mvarchive_core::{
    quote_ident, BatchWindow, ColumnDefinition, DestinationStore, Error, ProjectKey, Result,
    RowBatch, SourcePurge, SourceStore, LINK_COLUMN, PROJECTS_TABLE, PROJECT_KEY_COLUMN,
    PROJECT_TABLES,
};

type Row = Map<String, JsonValue>;
type InsertHook = Arc<dyn Fn(&str) + Send + Sync>;

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    ListProjects,
    FetchProject(String),
    Count(String),
    Columns(String),
    Fetch { table: String, offset: u64, rows: usize },
    ProjectExists(String),
    TableExists(String),
    ColumnNames(String),
    Ddl(String),
    Insert { table: String, rows: usize },
    Delete { table: String, rows: u64 },
}

impl StoreOp {
    /// Calls that change the store.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StoreOp::Ddl(_) | StoreOp::Insert { .. } | StoreOp::Delete { .. }
        )
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            StoreOp::Count(t)
            | StoreOp::Columns(t)
            | StoreOp::TableExists(t)
            | StoreOp::ColumnNames(t)
            | StoreOp::Ddl(t) => Some(t.as_str()),
            StoreOp::Fetch { table, .. }
            | StoreOp::Insert { table, .. }
            | StoreOp::Delete { table, .. } => Some(table.as_str()),
            _ => None,
        }
    }
}

/// Injected failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Every call fails with a connection error.
    Unreachable,
    /// `CREATE TABLE` for this table is rejected.
    Ddl(String),
    /// Inserts into this table lose the connection.
    Insert(String),
    /// Deletes from this table lose the connection.
    Delete(String),
    /// Linked rows of this table vanish once the first page has been read,
    /// as if deleted concurrently after they were counted.
    Vanish(String),
}

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<ColumnDefinition>,
    rows: Vec<Row>,
}

impl MemTable {
    fn key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, MemTable>,
    ops: Vec<StoreOp>,
    faults: HashSet<Fault>,
}

impl Inner {
    fn guard(&self) -> Result<()> {
        if self.faults.contains(&Fault::Unreachable) {
            return Err(Error::Connection("memory store unreachable".to_string()));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&MemTable> {
        self.tables
            .get(name)
            .ok_or_else(|| missing_relation(name))
    }
}

fn missing_relation(table: &str) -> Error {
    Error::copy(table, format!("relation {} does not exist", quote_ident(table)))
}

/// Text form of a value, mirroring a `::text` cast.
fn as_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn matches_key(row: &Row, column: &str, key: &ProjectKey) -> bool {
    row.get(column)
        .and_then(as_text)
        .is_some_and(|v| v == key.as_str())
}

/// In-memory relational store.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    on_insert: Option<InsertHook>,
}

impl MemoryStore {
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    /// Every call made so far, in order.
    pub async fn ops(&self) -> Vec<StoreOp> {
        self.inner.lock().await.ops.clone()
    }

    /// Calls that changed the store.
    pub async fn writes(&self) -> Vec<StoreOp> {
        self.ops().await.into_iter().filter(StoreOp::is_write).collect()
    }

    /// Row counts of each insert into `table`, in order.
    pub async fn inserts(&self, table: &str) -> Vec<usize> {
        self.ops()
            .await
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Insert { table: t, rows } if t == table => Some(rows),
                _ => None,
            })
            .collect()
    }

    /// Tables deleted from, in order.
    pub async fn deletions(&self) -> Vec<String> {
        self.ops()
            .await
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Delete { table, .. } => Some(table),
                _ => None,
            })
            .collect()
    }

    /// Recorded calls touching `table`.
    pub async fn ops_on(&self, table: &str) -> Vec<StoreOp> {
        self.ops()
            .await
            .into_iter()
            .filter(|op| op.table() == Some(table))
            .collect()
    }

    pub async fn clear_ops(&self) {
        self.inner.lock().await.ops.clear();
    }

    pub async fn has_table(&self, table: &str) -> bool {
        self.inner.lock().await.tables.contains_key(table)
    }

    /// Rows in `table`; 0 when absent.
    pub async fn row_count(&self, table: &str) -> usize {
        self.inner
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// Rows in `table` linked to `key`.
    pub async fn linked_count(&self, table: &str, key: &str) -> usize {
        let column = if table == PROJECTS_TABLE {
            PROJECT_KEY_COLUMN
        } else {
            LINK_COLUMN
        };
        let inner = self.inner.lock().await;
        let Some(t) = inner.tables.get(table) else {
            return 0;
        };
        t.rows
            .iter()
            .filter(|r| r.get(column).and_then(as_text).as_deref() == Some(key))
            .count()
    }

    /// Snapshot of the rows in `table`.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub async fn inject(&self, fault: Fault) {
        self.inner.lock().await.faults.insert(fault);
    }

    pub async fn clear_faults(&self) {
        self.inner.lock().await.faults.clear();
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.inner.lock().await.guard()
    }

    async fn list_project_keys(&self) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        inner.ops.push(StoreOp::ListProjects);
        let keys = inner
            .table(PROJECTS_TABLE)?
            .rows
            .iter()
            .filter_map(|r| r.get(PROJECT_KEY_COLUMN).and_then(as_text))
            .collect();
        Ok(keys)
    }

    async fn fetch_project_record(&self, key: &ProjectKey) -> Result<Option<Row>> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        inner.ops.push(StoreOp::FetchProject(key.to_string()));
        Ok(inner.tables.get(PROJECTS_TABLE).and_then(|t| {
            t.rows
                .iter()
                .find(|r| matches_key(r, PROJECT_KEY_COLUMN, key))
                .cloned()
        }))
    }

    async fn count_linked_rows(&self, table: &str, key: &ProjectKey) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        inner.ops.push(StoreOp::Count(table.to_string()));
        let count = inner
            .table(table)?
            .rows
            .iter()
            .filter(|r| matches_key(r, LINK_COLUMN, key))
            .count();
        Ok(count as u64)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnDefinition>> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        inner.ops.push(StoreOp::Columns(table.to_string()));
        Ok(inner
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn fetch_linked_batch(
        &self,
        table: &str,
        key: &ProjectKey,
        window: BatchWindow,
    ) -> Result<RowBatch> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        let rows: Vec<Row> = inner
            .table(table)?
            .rows
            .iter()
            .filter(|r| matches_key(r, LINK_COLUMN, key))
            .skip(window.offset as usize)
            .take(window.size as usize)
            .cloned()
            .collect();
        inner.ops.push(StoreOp::Fetch {
            table: table.to_string(),
            offset: window.offset,
            rows: rows.len(),
        });
        if inner.faults.contains(&Fault::Vanish(table.to_string())) {
            if let Some(t) = inner.tables.get_mut(table) {
                t.rows.retain(|r| !matches_key(r, LINK_COLUMN, key));
            }
        }
        Ok(RowBatch::from_rows(rows))
    }
}

#[async_trait]
impl DestinationStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.inner.lock().await.guard()
    }

    async fn project_exists(&self, key: &ProjectKey) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        inner.ops.push(StoreOp::ProjectExists(key.to_string()));
        Ok(inner.tables.get(PROJECTS_TABLE).is_some_and(|t| {
            t.rows
                .iter()
                .any(|r| matches_key(r, PROJECT_KEY_COLUMN, key))
        }))
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        inner.ops.push(StoreOp::TableExists(table.to_string()));
        Ok(inner.tables.contains_key(table))
    }

    async fn table_column_names(&self, table: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        inner.ops.push(StoreOp::ColumnNames(table.to_string()));
        Ok(inner
            .tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default())
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        let (table, columns) = parse_create_table(statement).ok_or_else(|| {
            Error::InvalidArgument(format!("unsupported statement: {statement}"))
        })?;
        if inner.faults.contains(&Fault::Ddl(table.clone())) {
            return Err(Error::schema(&table, "permission denied for schema public"));
        }
        if inner.tables.contains_key(&table) {
            return Err(Error::schema(
                &table,
                format!("relation {} already exists", quote_ident(&table)),
            ));
        }
        inner.ops.push(StoreOp::Ddl(table.clone()));
        inner.tables.insert(
            table,
            MemTable {
                columns,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn bulk_insert(&self, table: &str, batch: &RowBatch) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        if inner.faults.contains(&Fault::Insert(table.to_string())) {
            return Err(Error::Connection("connection reset by peer".to_string()));
        }

        let target = inner.table(table)?;
        if let Some(col) = batch.columns.iter().find(|c| !target.has_column(c)) {
            return Err(Error::copy(
                table,
                format!("column {} does not exist", quote_ident(col)),
            ));
        }

        let key_columns = target.key_columns();
        if !key_columns.is_empty() {
            let key_of = |row: &Row| -> Vec<JsonValue> {
                key_columns
                    .iter()
                    .map(|c| row.get(*c).cloned().unwrap_or(JsonValue::Null))
                    .collect()
            };
            let mut seen: HashSet<String> = target
                .rows
                .iter()
                .map(|r| JsonValue::Array(key_of(r)).to_string())
                .collect();
            for row in &batch.rows {
                if !seen.insert(JsonValue::Array(key_of(row)).to_string()) {
                    return Err(Error::copy(
                        table,
                        "duplicate key value violates unique constraint",
                    ));
                }
            }
        }

        let rows = batch.rows.len();
        if let Some(t) = inner.tables.get_mut(table) {
            t.rows.extend(batch.rows.iter().cloned());
        }
        inner.ops.push(StoreOp::Insert {
            table: table.to_string(),
            rows,
        });
        drop(inner);

        if let Some(ref hook) = self.on_insert {
            hook(table);
        }
        Ok(rows as u64)
    }
}

impl MemoryStore {
    async fn delete_matching(&self, table: &str, column: &str, key: &ProjectKey) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        inner.guard()?;
        if inner.faults.contains(&Fault::Delete(table.to_string())) {
            return Err(Error::Connection("connection reset by peer".to_string()));
        }
        let t = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| missing_relation(table))?;
        let before = t.rows.len();
        t.rows.retain(|r| !matches_key(r, column, key));
        let removed = (before - t.rows.len()) as u64;
        inner.ops.push(StoreOp::Delete {
            table: table.to_string(),
            rows: removed,
        });
        Ok(removed)
    }
}

#[async_trait]
impl SourcePurge for MemoryStore {
    async fn delete_linked_rows(&self, table: &str, key: &ProjectKey) -> Result<u64> {
        self.delete_matching(table, LINK_COLUMN, key).await
    }

    async fn delete_project_record(&self, key: &ProjectKey) -> Result<u64> {
        self.delete_matching(PROJECTS_TABLE, PROJECT_KEY_COLUMN, key)
            .await
    }
}

/// Read back the table name and columns of a generated `CREATE TABLE`.
///
/// Column types are not interpreted; primary key membership is.
fn parse_create_table(sql: &str) -> Option<(String, Vec<ColumnDefinition>)> {
    let rest = sql.strip_prefix("CREATE TABLE ")?;
    let open = rest.find(" (")?;
    let name = rest[..open].rsplit("\".\"").next()?.trim_matches('"').to_string();
    let body = rest[open + 2..].strip_suffix(')')?;

    let mut columns = Vec::new();
    let mut key = Vec::new();
    for part in split_top_level(body) {
        let part = part.trim();
        if let Some(list) = part.strip_prefix("PRIMARY KEY (") {
            key = list
                .trim_end_matches(')')
                .split(", ")
                .map(|c| c.trim_matches('"').to_string())
                .collect();
        } else if let Some(quoted) = part.strip_prefix('"') {
            let end = quoted.find('"')?;
            let column = ColumnDefinition::new(&quoted[..end], quoted[end + 1..].trim());
            columns.push(column);
        }
    }
    for column in &mut columns {
        if key.contains(&column.name) {
            column.is_primary_key = true;
            column.is_nullable = false;
        }
    }
    Some((name, columns))
}

/// Split on commas outside parentheses and double quotes.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    for (i, ch) in body.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

/// Columns used for every seeded dependent table.
pub fn dependent_columns() -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition::new("ID", "integer").primary_key(),
        ColumnDefinition::new(LINK_COLUMN, "character varying")
            .with_length(50)
            .not_null(),
        ColumnDefinition::new("Name", "text"),
    ]
}

/// Columns of the seeded `Projects` table.
pub fn project_columns() -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition::new("ID", "integer").primary_key(),
        ColumnDefinition::new(PROJECT_KEY_COLUMN, "character varying")
            .with_length(50)
            .not_null(),
        ColumnDefinition::new("Name", "text"),
    ]
}

/// Builder for [`MemoryStore`].
#[derive(Default)]
pub struct MemoryStoreBuilder {
    tables: BTreeMap<String, MemTable>,
    faults: HashSet<Fault>,
    on_insert: Option<InsertHook>,
    next_id: u64,
}

impl MemoryStoreBuilder {
    /// Add an empty table. Replaces any table of the same name.
    pub fn with_table(mut self, name: &str, columns: Vec<ColumnDefinition>) -> Self {
        self.tables.insert(
            name.to_string(),
            MemTable {
                columns,
                rows: Vec::new(),
            },
        );
        self
    }

    /// Add `Projects` and every registered dependent table, empty, unless
    /// already present.
    pub fn with_registry_tables(mut self) -> Self {
        self.tables
            .entry(PROJECTS_TABLE.to_string())
            .or_insert_with(|| MemTable {
                columns: project_columns(),
                rows: Vec::new(),
            });
        for spec in PROJECT_TABLES {
            self.tables
                .entry(spec.name.to_string())
                .or_insert_with(|| MemTable {
                    columns: dependent_columns(),
                    rows: Vec::new(),
                });
        }
        self
    }

    /// Append a raw row to an existing table.
    pub fn with_row(mut self, table: &str, row: JsonValue) -> Self {
        if let (Some(t), JsonValue::Object(map)) = (self.tables.get_mut(table), row) {
            t.rows.push(map);
        }
        self
    }

    /// Seed a project: its root record plus `count` rows in each listed
    /// table. Registry tables are created as needed.
    pub fn with_project(mut self, key: &str, counts: &[(&str, usize)]) -> Self {
        self = self.with_registry_tables();
        let id = self.next_id();
        self = self.with_row(
            PROJECTS_TABLE,
            json!({"ID": id, PROJECT_KEY_COLUMN: key, "Name": format!("Project {key}")}),
        );
        for (table, count) in counts {
            for n in 0..*count {
                let id = self.next_id();
                self = self.with_row(
                    table,
                    json!({"ID": id, LINK_COLUMN: key, "Name": format!("{table} {n}")}),
                );
            }
        }
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.insert(fault);
        self
    }

    /// Called with the table name after every successful insert.
    pub fn on_insert(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_insert = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> MemoryStore {
        MemoryStore {
            inner: Mutex::new(Inner {
                tables: self.tables,
                ops: Vec::new(),
                faults: self.faults,
            }),
            on_insert: self.on_insert,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}
