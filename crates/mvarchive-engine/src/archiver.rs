//! Entry point tying the components to a pair of stores.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mvarchive_core::{
    ArchiveConfig, ArchiveProgress, DestinationStore, Error, Result, SourcePurge, SourceStore,
};

use crate::bulk::BulkOrchestrator;
use crate::progress::ProgressSink;
use crate::project::{ProjectArchiver, SourceCleanup};

/// Result of pinging both stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub source_ok: bool,
    pub destination_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_error: Option<String>,
}

impl ConnectionReport {
    pub fn all_ok(&self) -> bool {
        self.source_ok && self.destination_ok
    }
}

/// Project archive engine over one source and one destination.
pub struct Archiver {
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
    project: Arc<ProjectArchiver>,
    bulk: BulkOrchestrator,
    cancel: CancellationToken,
}

impl Archiver {
    pub fn builder(
        source: Arc<dyn SourceStore>,
        destination: Arc<dyn DestinationStore>,
    ) -> ArchiverBuilder {
        ArchiverBuilder::new(source, destination)
    }

    /// Archive one project. See [`ProjectArchiver::archive_project`].
    pub async fn archive_project(&self, key: &str, sink: &ProgressSink) -> Result<ArchiveProgress> {
        self.project.archive_project(key, sink).await
    }

    /// Archive every project. See [`BulkOrchestrator::archive_all`].
    pub async fn archive_all(&self, sink: &ProgressSink) -> Result<ArchiveProgress> {
        self.bulk.archive_all(sink).await
    }

    /// Project keys currently in the source.
    pub async fn list_project_keys(&self) -> Result<Vec<String>> {
        self.source.list_project_keys().await
    }

    /// Ping both stores and report each outcome. Never fails; the report
    /// carries the errors.
    pub async fn test_connections(&self) -> ConnectionReport {
        let start = Instant::now();
        let source = self.source.ping().await;
        let destination = self.destination.ping().await;

        for (label, result) in [("source", &source), ("destination", &destination)] {
            match result {
                Ok(()) => info!(
                    subsystem = "engine",
                    component = "archiver",
                    op = "test_connection",
                    store = label,
                    "Connection OK"
                ),
                Err(e) => warn!(
                    subsystem = "engine",
                    component = "archiver",
                    op = "test_connection",
                    store = label,
                    error = %e,
                    "Connection failed"
                ),
            }
        }
        debug!(
            subsystem = "engine",
            component = "archiver",
            duration_ms = start.elapsed().as_millis() as u64,
            "Connection test finished"
        );

        ConnectionReport {
            source_ok: source.is_ok(),
            destination_ok: destination.is_ok(),
            source_error: source.err().map(|e| e.to_string()),
            destination_error: destination.err().map(|e| e.to_string()),
        }
    }

    /// Request cooperative cancellation of any run in progress.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Handle that cancels this archiver's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_dry_run(&self) -> bool {
        self.project.is_dry_run()
    }
}

/// Builder for [`Archiver`].
///
/// Defaults to a dry run. A run that cleans the source needs both
/// `dry_run(false)` and a purge handle.
pub struct ArchiverBuilder {
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
    purge: Option<Arc<dyn SourcePurge>>,
    dry_run: bool,
    cancel: CancellationToken,
}

impl ArchiverBuilder {
    pub fn new(source: Arc<dyn SourceStore>, destination: Arc<dyn DestinationStore>) -> Self {
        Self {
            source,
            destination,
            purge: None,
            dry_run: true,
            cancel: CancellationToken::new(),
        }
    }

    /// Take the dry-run switch from a run configuration.
    pub fn with_config(mut self, config: &ArchiveConfig) -> Self {
        self.dry_run = config.dry_run;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Deletion handle used when not in dry-run mode.
    pub fn with_purge(mut self, purge: Arc<dyn SourcePurge>) -> Self {
        self.purge = Some(purge);
        self
    }

    /// Use an external token, for example a child of an application-wide one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn build(self) -> Result<Archiver> {
        let cleanup = match (self.dry_run, self.purge) {
            (true, _) => SourceCleanup::DryRun,
            (false, Some(purge)) => SourceCleanup::Purge(purge),
            (false, None) => {
                return Err(Error::Config(
                    "source cleanup requested without a purge handle".to_string(),
                ))
            }
        };

        let project = Arc::new(ProjectArchiver::new(
            self.source.clone(),
            self.destination.clone(),
            cleanup,
            self.cancel.clone(),
        ));
        let bulk = BulkOrchestrator::new(self.source.clone(), project.clone(), self.cancel.clone());

        Ok(Archiver {
            source: self.source,
            destination: self.destination,
            project,
            bulk,
            cancel: self.cancel,
        })
    }
}
