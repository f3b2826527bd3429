//! Archive a single project end to end.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mvarchive_core::{
    defaults, deletion_order, ArchiveProgress, DestinationStore, Error, ProjectKey, Result,
    RowBatch, RunState, SourcePurge, SourceStore, PROJECTS_TABLE, PROJECT_TABLES,
};

use crate::copier::BatchCopier;
use crate::progress::{checkpoint, Interrupted, ProgressSink};
use crate::replicator::SchemaReplicator;
use crate::table::TableArchiver;
use crate::TABLES_PER_PROJECT;

/// What happens to the source once a project has been copied.
///
/// A dry-run archiver holds no purge handle at all, so it has nothing it
/// could delete with.
#[derive(Clone)]
pub enum SourceCleanup {
    DryRun,
    Purge(Arc<dyn SourcePurge>),
}

impl SourceCleanup {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, SourceCleanup::DryRun)
    }
}

impl fmt::Debug for SourceCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceCleanup::DryRun => f.write_str("DryRun"),
            SourceCleanup::Purge(_) => f.write_str("Purge"),
        }
    }
}

/// How a project run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectOutcome {
    /// Already present in the destination; nothing was written.
    Skipped,
    /// Copied. `cleaned` is true when the source rows were removed.
    Archived { rows: u64, cleaned: bool },
}

impl ProjectOutcome {
    pub fn status(&self, key: &ProjectKey) -> String {
        match self {
            ProjectOutcome::Skipped => defaults::STATUS_ALREADY_ARCHIVED.to_string(),
            ProjectOutcome::Archived { cleaned: false, .. } => {
                format!("Project {key} archived (dry run, source retained)")
            }
            ProjectOutcome::Archived { cleaned: true, .. } => {
                format!("Project {key} archived and removed from source")
            }
        }
    }
}

/// Root record, every dependent table, then optional source cleanup.
pub struct ProjectArchiver {
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
    replicator: Arc<SchemaReplicator>,
    copier: Arc<BatchCopier>,
    tables: TableArchiver,
    cleanup: SourceCleanup,
    cancel: CancellationToken,
}

impl ProjectArchiver {
    pub fn new(
        source: Arc<dyn SourceStore>,
        destination: Arc<dyn DestinationStore>,
        cleanup: SourceCleanup,
        cancel: CancellationToken,
    ) -> Self {
        let replicator = Arc::new(SchemaReplicator::new(source.clone(), destination.clone()));
        let copier = Arc::new(BatchCopier::new(source.clone(), destination.clone()));
        let tables = TableArchiver::new(
            source.clone(),
            replicator.clone(),
            copier.clone(),
            cancel.clone(),
        );
        Self {
            source,
            destination,
            replicator,
            copier,
            tables,
            cleanup,
            cancel,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.cleanup.is_dry_run()
    }

    /// Archive one project and mark the final snapshot complete.
    ///
    /// An empty key is rejected before any I/O. On failure the terminal
    /// snapshot (`Failed` or `Cancelled`) is pushed before the error is
    /// returned.
    pub async fn archive_project(&self, key: &str, sink: &ProgressSink) -> Result<ArchiveProgress> {
        let key = ProjectKey::new(key)?;
        let mut progress = ArchiveProgress::start(1, TABLES_PER_PROJECT);
        progress.projects_processed = 1;

        match self.run(&key, progress, sink).await {
            Ok((mut progress, outcome)) => {
                let state = match outcome {
                    ProjectOutcome::Skipped => RunState::Skipped,
                    ProjectOutcome::Archived { .. } => RunState::Completed,
                };
                progress.finish(state, outcome.status(&key));
                sink.send(&progress);
                Ok(progress)
            }
            Err(Interrupted {
                mut progress,
                error,
            }) => {
                progress.fail(&error);
                sink.send(&progress);
                Err(error)
            }
        }
    }

    /// Archive one project without marking the snapshot terminal.
    ///
    /// Aggregate counters on `progress` (projects processed, failures) are
    /// carried through untouched, so a bulk run can forward every snapshot.
    pub async fn run(
        &self,
        key: &ProjectKey,
        mut progress: ArchiveProgress,
        sink: &ProgressSink,
    ) -> std::result::Result<(ArchiveProgress, ProjectOutcome), Interrupted> {
        let start = Instant::now();
        progress.current_project = key.to_string();
        progress.current_table.clear();
        progress.current_record = 0;
        progress.total_records = 0;
        progress.tables_processed = 0;
        progress.total_tables = TABLES_PER_PROJECT;
        progress.status = format!("Archiving project {key}");
        sink.send(&progress);

        info!(
            subsystem = "engine",
            component = "project",
            op = "start",
            project = %key,
            dry_run = self.is_dry_run(),
            "Archiving project"
        );

        match self.destination.project_exists(key).await {
            Ok(true) => {
                // Only the root record is checked. It is copied first, so a
                // run that failed part way also lands here on retry.
                warn!(
                    subsystem = "engine",
                    component = "project",
                    project = %key,
                    checked_table = PROJECTS_TABLE,
                    "Project root already in destination, skipping; dependent tables are not verified"
                );
                progress.status = defaults::STATUS_ALREADY_ARCHIVED.to_string();
                sink.send(&progress);
                return Ok((progress, ProjectOutcome::Skipped));
            }
            Ok(false) => {}
            Err(e) => return Err(self.interrupt(key, progress, e)),
        }

        let mut rows = match self.copy_root(key).await {
            Ok(rows) => rows,
            Err(e) => return Err(self.interrupt(key, progress, e)),
        };
        progress.current_table = PROJECTS_TABLE.to_string();
        progress.current_record = rows;
        progress.total_records = rows;
        progress.tables_processed = 1;
        progress.status = "Copied project record".to_string();
        sink.send(&progress);

        for spec in PROJECT_TABLES {
            if let Err(e) = checkpoint(&self.cancel) {
                return Err(self.interrupt(key, progress, e));
            }
            progress = self.tables.archive_table(spec.name, key, progress, sink).await?;
            rows += progress.total_records;
            progress.tables_processed += 1;
            sink.send(&progress);
        }

        let cleaned = match &self.cleanup {
            SourceCleanup::DryRun => {
                debug!(
                    subsystem = "engine",
                    component = "project",
                    project = %key,
                    "Dry run, source retained"
                );
                false
            }
            SourceCleanup::Purge(purge) => {
                if let Err(e) = checkpoint(&self.cancel) {
                    return Err(self.interrupt(key, progress, e));
                }
                progress = self.purge_source(purge.as_ref(), key, progress, sink).await?;
                true
            }
        };

        info!(
            subsystem = "engine",
            component = "project",
            op = "archive_project",
            project = %key,
            rows,
            cleaned,
            duration_ms = start.elapsed().as_millis() as u64,
            "Project archived"
        );
        Ok((progress, ProjectOutcome::Archived { rows, cleaned }))
    }

    /// Copy the project's root record. The record is read before anything
    /// is created on the destination.
    async fn copy_root(&self, key: &ProjectKey) -> Result<u64> {
        let record = self
            .source
            .fetch_project_record(key)
            .await
            .map_err(|e| e.into_copy(PROJECTS_TABLE))?
            .ok_or_else(|| Error::ProjectNotFound(key.to_string()))?;

        self.replicator.ensure_table(PROJECTS_TABLE).await?;
        self.copier
            .insert_batch(PROJECTS_TABLE, &RowBatch::from_rows(vec![record]))
            .await
    }

    /// Delete from the source in dependency-safe order. Once started this
    /// runs to the end; cancellation is not observed here.
    async fn purge_source(
        &self,
        purge: &dyn SourcePurge,
        key: &ProjectKey,
        mut progress: ArchiveProgress,
        sink: &ProgressSink,
    ) -> std::result::Result<ArchiveProgress, Interrupted> {
        let start = Instant::now();
        warn!(
            subsystem = "engine",
            component = "project",
            op = "purge",
            project = %key,
            "Removing archived rows from source"
        );
        progress.status = defaults::STATUS_CLEANING.to_string();
        sink.send(&progress);

        let mut removed = 0u64;
        for table in deletion_order() {
            let result = if table == PROJECTS_TABLE {
                purge.delete_project_record(key).await
            } else {
                purge.delete_linked_rows(table, key).await
            };
            match result {
                Ok(n) => removed += n,
                Err(e) => {
                    progress.status = format!("Error cleaning {table}");
                    return Err(self.interrupt(key, progress, e.into_deletion(table)));
                }
            }
        }

        info!(
            subsystem = "engine",
            component = "project",
            op = "purge",
            project = %key,
            rows = removed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Source cleaned"
        );
        Ok(progress)
    }

    fn interrupt(&self, key: &ProjectKey, progress: ArchiveProgress, error: Error) -> Interrupted {
        if !error.is_cancelled() {
            error!(
                subsystem = "engine",
                component = "project",
                project = %key,
                error = %error,
                "Project archive failed"
            );
        }
        Interrupted::new(progress, error)
    }
}
