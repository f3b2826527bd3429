//! Archive every project in the source, one after another.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use mvarchive_core::{
    ArchiveProgress, Error, ProjectFailure, ProjectKey, Result, RunState, SourceStore,
};

use crate::progress::{checkpoint, Interrupted, ProgressSink};
use crate::project::ProjectArchiver;
use crate::TABLES_PER_PROJECT;

/// Sequential, best-effort bulk run.
///
/// A project that fails is recorded in the snapshot's `failures` and the run
/// moves on. Cancellation and a failure to list projects end the run.
pub struct BulkOrchestrator {
    source: Arc<dyn SourceStore>,
    project: Arc<ProjectArchiver>,
    cancel: CancellationToken,
}

impl BulkOrchestrator {
    pub fn new(
        source: Arc<dyn SourceStore>,
        project: Arc<ProjectArchiver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            project,
            cancel,
        }
    }

    /// Archive every project listed at the start of the run.
    ///
    /// Returns the terminal snapshot: `Completed` when every project was
    /// archived or skipped, `Failed` with a summary status when any project
    /// failed. Cancellation and enumeration failures are returned as errors
    /// after their terminal snapshot has been pushed.
    pub async fn archive_all(&self, sink: &ProgressSink) -> Result<ArchiveProgress> {
        let start = Instant::now();
        let mut progress = ArchiveProgress::start(0, TABLES_PER_PROJECT);
        progress.status = "Listing projects".to_string();
        sink.send(&progress);

        let keys = match self.source.list_project_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                error!(
                    subsystem = "engine",
                    component = "bulk",
                    error = %e,
                    "Failed to list projects"
                );
                progress.fail(&e);
                sink.send(&progress);
                return Err(e);
            }
        };

        let total = keys.len() as u64;
        progress.total_projects = total;
        progress.status = format!("Found {total} projects");
        sink.send(&progress);
        info!(
            subsystem = "engine",
            component = "bulk",
            op = "start",
            total_projects = total,
            dry_run = self.project.is_dry_run(),
            "Bulk archive started"
        );

        for (i, raw_key) in keys.iter().enumerate() {
            if let Err(e) = checkpoint(&self.cancel) {
                progress.fail(&e);
                sink.send(&progress);
                return Err(e);
            }

            progress.current_project = raw_key.clone();
            progress.projects_processed = i as u64 + 1;
            progress.status = format!("Archiving project {} of {}: {}", i + 1, total, raw_key);
            sink.send(&progress);

            let key = match ProjectKey::new(raw_key.as_str()) {
                Ok(key) => key,
                Err(e) => {
                    self.record_failure(&mut progress, raw_key, &e);
                    sink.send(&progress);
                    continue;
                }
            };

            match self.project.run(&key, progress, sink).await {
                Ok((next, outcome)) => {
                    progress = next;
                    progress.status = outcome.status(&key);
                }
                Err(Interrupted {
                    progress: next,
                    error,
                }) => {
                    progress = next;
                    if error.is_cancelled() {
                        progress.fail(&error);
                        sink.send(&progress);
                        return Err(error);
                    }
                    self.record_failure(&mut progress, raw_key, &error);
                }
            }
            sink.send(&progress);
        }

        let failed = progress.failures.len();
        if failed == 0 {
            progress.finish(
                RunState::Completed,
                format!("Archived {total} projects"),
            );
        } else {
            progress.finish(
                RunState::Failed,
                format!("{failed} of {total} projects failed"),
            );
        }
        sink.send(&progress);

        info!(
            subsystem = "engine",
            component = "bulk",
            op = "archive_all",
            total_projects = total,
            failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Bulk archive finished"
        );
        Ok(progress)
    }

    fn record_failure(&self, progress: &mut ArchiveProgress, key: &str, error: &Error) {
        error!(
            subsystem = "engine",
            component = "bulk",
            project = key,
            error = %error,
            "Project failed, continuing"
        );
        progress.failures.push(ProjectFailure {
            project: key.to_string(),
            kind: error.kind(),
            error: error.to_string(),
        });
        progress.status = format!("Project {key} failed: {error}");
    }
}
