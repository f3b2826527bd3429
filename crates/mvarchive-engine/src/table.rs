//! Archive one table's slice of a project.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use mvarchive_core::{ArchiveProgress, BatchWindow, Error, ProjectKey, SourceStore};

use crate::copier::BatchCopier;
use crate::progress::{checkpoint, Interrupted, ProgressSink};
use crate::replicator::SchemaReplicator;

/// Counts, replicates and pages through one table for one project.
pub struct TableArchiver {
    source: Arc<dyn SourceStore>,
    replicator: Arc<SchemaReplicator>,
    copier: Arc<BatchCopier>,
    cancel: CancellationToken,
}

impl TableArchiver {
    pub fn new(
        source: Arc<dyn SourceStore>,
        replicator: Arc<SchemaReplicator>,
        copier: Arc<BatchCopier>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            replicator,
            copier,
            cancel,
        }
    }

    /// Copy every row of `table` linked to `key`, one window at a time.
    ///
    /// The snapshot is taken by value and handed back updated. A snapshot is
    /// pushed after each window, including windows that turn up no rows. On
    /// failure the annotated snapshot comes back inside [`Interrupted`] after
    /// it has been pushed.
    pub async fn archive_table(
        &self,
        table: &str,
        key: &ProjectKey,
        mut progress: ArchiveProgress,
        sink: &ProgressSink,
    ) -> Result<ArchiveProgress, Interrupted> {
        let start = Instant::now();
        progress.current_table = table.to_string();
        progress.current_record = 0;
        progress.total_records = 0;

        let total = match self.source.count_linked_rows(table, key).await {
            Ok(total) => total,
            Err(e) => return Err(self.interrupt(table, progress, e.into_copy(table), sink)),
        };

        if total == 0 {
            debug!(
                subsystem = "engine",
                component = "table",
                db_table = table,
                project = %key,
                "No linked rows, table skipped"
            );
            progress.status = format!("No rows in {table}");
            sink.send(&progress);
            return Ok(progress);
        }

        if let Err(e) = self.replicator.ensure_table(table).await {
            return Err(self.interrupt(table, progress, e, sink));
        }

        progress.total_records = total;
        progress.status = format!("Archiving {table}");
        sink.send(&progress);

        for window in BatchWindow::pages(total) {
            if let Err(e) = checkpoint(&self.cancel) {
                return Err(self.interrupt(table, progress, e, sink));
            }
            let copied = match self.copier.copy_batch(table, key, window).await {
                Ok(copied) => copied,
                Err(e) => return Err(self.interrupt(table, progress, e, sink)),
            };
            let expected = window.end(total).saturating_sub(window.offset);
            if copied < expected {
                debug!(
                    subsystem = "engine",
                    component = "table",
                    db_table = table,
                    project = %key,
                    offset = window.offset,
                    expected,
                    rows = copied,
                    "Short page, rows changed since count"
                );
            }
            progress.current_record = window.end(total);
            sink.send(&progress);
        }

        info!(
            subsystem = "engine",
            component = "table",
            op = "archive_table",
            db_table = table,
            project = %key,
            rows = total,
            duration_ms = start.elapsed().as_millis() as u64,
            "Table archived"
        );
        Ok(progress)
    }

    fn interrupt(
        &self,
        table: &str,
        mut progress: ArchiveProgress,
        error: Error,
        sink: &ProgressSink,
    ) -> Interrupted {
        if !error.is_cancelled() {
            error!(
                subsystem = "engine",
                component = "table",
                db_table = table,
                error = %error,
                "Table archive failed"
            );
            progress.status = format!("Error archiving {table}: {error}");
            sink.send(&progress);
        }
        Interrupted::new(progress, error)
    }
}
