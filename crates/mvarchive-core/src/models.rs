//! Core data models for the archive engine.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::defaults::BATCH_SIZE;
use crate::error::{Error, ErrorKind, Result};

// =============================================================================
// PROJECT KEY
// =============================================================================

/// Project join key (`LinkID`), distinct from the project's primary id.
///
/// Guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProjectKey(String);

impl ProjectKey {
    /// Build a key, rejecting empty or whitespace-only input.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "project key cannot be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// BATCHING
// =============================================================================

/// One page of a filtered table scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindow {
    pub offset: u64,
    pub size: u64,
}

impl BatchWindow {
    /// Window at `offset` with the fixed batch size.
    pub fn at(offset: u64) -> Self {
        Self {
            offset,
            size: BATCH_SIZE,
        }
    }

    /// Rows covered once this window is done, capped at `total`.
    pub fn end(&self, total: u64) -> u64 {
        self.offset.saturating_add(self.size).min(total)
    }

    /// Every window needed to cover `total` rows: `ceil(total / size)` pages.
    pub fn pages(total: u64) -> impl Iterator<Item = BatchWindow> {
        (0..total).step_by(BATCH_SIZE as usize).map(BatchWindow::at)
    }
}

/// Source column metadata as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ColumnDefinition {
    pub name: String,
    /// `information_schema.columns.data_type`
    pub data_type: String,
    /// Underlying type name, used for arrays and user-defined types.
    pub udt_name: String,
    pub is_nullable: bool,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub column_default: Option<String>,
    pub is_primary_key: bool,
}

impl ColumnDefinition {
    /// Plain nullable column of the given type, for fixtures.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            udt_name: data_type.clone(),
            data_type,
            is_nullable: true,
            character_maximum_length: None,
            numeric_precision: None,
            numeric_scale: None,
            column_default: None,
            is_primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    pub fn with_length(mut self, length: i32) -> Self {
        self.character_maximum_length = Some(length);
        self
    }

    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.numeric_precision = Some(precision);
        self.numeric_scale = Some(scale);
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.column_default = Some(default.into());
        self
    }

    pub fn with_udt(mut self, udt_name: impl Into<String>) -> Self {
        self.udt_name = udt_name.into();
        self
    }
}

/// One materialised page of rows, each keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, JsonValue>>,
}

impl RowBatch {
    /// Build a batch from JSON objects, taking column names from the rows.
    pub fn from_rows(rows: Vec<Map<String, JsonValue>>) -> Self {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Lifecycle state of an archive run or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    /// Project was already present in the destination.
    Skipped,
    Failed,
    Cancelled,
}

/// A project that failed during a bulk run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectFailure {
    pub project: String,
    pub kind: ErrorKind,
    pub error: String,
}

/// Progress snapshot pushed to the consumer after each unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveProgress {
    pub current_table: String,
    pub current_record: u64,
    pub total_records: u64,
    pub current_project: String,
    pub projects_processed: u64,
    pub total_projects: u64,
    pub tables_processed: u64,
    pub total_tables: u64,
    pub status: String,
    pub state: RunState,
    pub is_complete: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProjectFailure>,
}

impl ArchiveProgress {
    /// Fresh snapshot for a run over `total_projects`, each touching
    /// `total_tables` tables.
    pub fn start(total_projects: u64, total_tables: u64) -> Self {
        Self {
            current_table: String::new(),
            current_record: 0,
            total_records: 0,
            current_project: String::new(),
            projects_processed: 0,
            total_projects,
            tables_processed: 0,
            total_tables,
            status: String::new(),
            state: RunState::Running,
            is_complete: false,
            started_at: Utc::now(),
            ended_at: None,
            failures: Vec::new(),
        }
    }

    /// Mark the snapshot terminal with the given state and status.
    pub fn finish(&mut self, state: RunState, status: impl Into<String>) {
        self.state = state;
        self.status = status.into();
        self.is_complete = true;
        self.ended_at = Some(Utc::now());
    }

    /// Terminal snapshot for a failed or cancelled step.
    pub fn fail(&mut self, error: &Error) {
        if error.is_cancelled() {
            self.finish(RunState::Cancelled, crate::defaults::STATUS_CANCELLED);
        } else {
            self.finish(RunState::Failed, format!("Archive failed: {error}"));
        }
    }

    /// Fraction of the current table copied, 0.0 to 1.0.
    pub fn table_fraction(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        self.current_record as f64 / self.total_records as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_key_rejects_empty() {
        assert!(matches!(ProjectKey::new(""), Err(Error::InvalidArgument(_))));
        assert!(matches!(ProjectKey::new("   "), Err(Error::InvalidArgument(_))));
        assert_eq!(ProjectKey::new("P-100").unwrap().as_str(), "P-100");
    }

    #[test]
    fn test_pages_cover_exact_row_count() {
        for (total, expected) in [(0u64, 0usize), (1, 1), (999, 1), (1000, 1), (1001, 2), (3500, 4)] {
            let pages: Vec<_> = BatchWindow::pages(total).collect();
            assert_eq!(pages.len(), expected, "total={total}");
            if let Some(last) = pages.last() {
                assert_eq!(last.end(total), total);
            }
        }
    }

    #[test]
    fn test_pages_offsets_step_by_batch_size() {
        let offsets: Vec<_> = BatchWindow::pages(3500).map(|w| w.offset).collect();
        assert_eq!(offsets, vec![0, 1000, 2000, 3000]);
        assert!(BatchWindow::pages(3500).all(|w| w.size == BATCH_SIZE));
    }

    #[test]
    fn test_row_batch_collects_columns_in_first_seen_order() {
        let rows = vec![
            json!({"ID": 1, "Name": "a"}).as_object().unwrap().clone(),
            json!({"ID": 2, "Extra": true}).as_object().unwrap().clone(),
        ];
        let batch = RowBatch::from_rows(rows);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.columns.len(), 3);
        assert!(batch.columns.contains(&"Extra".to_string()));
    }

    #[test]
    fn test_row_batch_wide_rows_list_each_column_once() {
        let row: Map<String, JsonValue> = (0..300)
            .map(|i| (format!("C{i:03}"), json!(i)))
            .collect();
        let batch = RowBatch::from_rows(vec![row; 1000]);
        assert_eq!(batch.len(), 1000);
        assert_eq!(batch.columns.len(), 300);
        assert_eq!(batch.columns[0], "C000");
        assert_eq!(batch.columns[299], "C299");
    }

    #[test]
    fn test_progress_fail_distinguishes_cancel() {
        let mut progress = ArchiveProgress::start(1, 29);
        progress.fail(&Error::Cancelled);
        assert_eq!(progress.state, RunState::Cancelled);
        assert!(progress.is_complete);

        let mut progress = ArchiveProgress::start(1, 29);
        progress.fail(&Error::copy("Parts", "boom"));
        assert_eq!(progress.state, RunState::Failed);
        assert!(progress.status.contains("Parts"));
        assert!(progress.ended_at.is_some());
    }

    #[test]
    fn test_progress_serializes_state_snake_case() {
        let mut progress = ArchiveProgress::start(2, 29);
        progress.finish(RunState::Skipped, "Project already archived");
        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value["state"], "skipped");
        assert!(value.get("failures").is_none());
    }

    #[test]
    fn test_table_fraction() {
        let mut progress = ArchiveProgress::start(1, 29);
        assert_eq!(progress.table_fraction(), 0.0);
        progress.total_records = 4;
        progress.current_record = 1;
        assert_eq!(progress.table_fraction(), 0.25);
    }
}
