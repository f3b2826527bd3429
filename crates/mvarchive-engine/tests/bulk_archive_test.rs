//! Bulk runs: every project, sequentially, best-effort with a summary.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use mvarchive_core::{ArchiveProgress, Error, ErrorKind, RunState, PROJECTS_TABLE};
use mvarchive_engine::test_fixtures::{dependent_columns, Fault, MemoryStore};
use mvarchive_engine::{Archiver, CancellationToken, ProgressSink};

fn drain(rx: &mut UnboundedReceiver<ArchiveProgress>) -> Vec<ArchiveProgress> {
    let mut snapshots = Vec::new();
    while let Ok(p) = rx.try_recv() {
        snapshots.push(p);
    }
    snapshots
}

/// Three projects with one Locations row each. Row ids are assigned in
/// order: P-1 gets 1 and 2, P-2 gets 3 and 4, P-3 gets 5 and 6.
fn three_projects() -> MemoryStore {
    MemoryStore::builder()
        .with_project("P-1", &[("Locations", 1)])
        .with_project("P-2", &[("Locations", 1)])
        .with_project("P-3", &[("Locations", 1)])
        .build()
}

#[tokio::test]
async fn test_bulk_archives_every_project() {
    let source = Arc::new(three_projects());
    let destination = Arc::new(MemoryStore::builder().build());
    let archiver = Archiver::builder(source.clone(), destination.clone())
        .dry_run(false)
        .with_purge(source.clone())
        .build()
        .unwrap();

    let progress = archiver.archive_all(&ProgressSink::noop()).await.unwrap();

    assert_eq!(progress.state, RunState::Completed);
    assert_eq!(progress.status, "Archived 3 projects");
    assert_eq!(progress.projects_processed, 3);
    assert_eq!(progress.total_projects, 3);
    assert!(progress.failures.is_empty());
    for key in ["P-1", "P-2", "P-3"] {
        assert_eq!(destination.linked_count(PROJECTS_TABLE, key).await, 1);
        assert_eq!(source.linked_count("Locations", key).await, 0);
    }
}

#[tokio::test]
async fn test_bulk_continues_past_failure_and_summarises() {
    let source = Arc::new(three_projects());
    // A stale row colliding with P-2's Locations row.
    let destination = Arc::new(
        MemoryStore::builder()
            .with_table("Locations", dependent_columns())
            .with_row(
                "Locations",
                json!({"ID": 4, "LinkIDProject": "stale", "Name": "stale"}),
            )
            .build(),
    );
    let archiver = Archiver::builder(source.clone(), destination.clone())
        .dry_run(false)
        .with_purge(source.clone())
        .build()
        .unwrap();

    let progress = archiver.archive_all(&ProgressSink::noop()).await.unwrap();

    assert_eq!(progress.state, RunState::Failed);
    assert!(progress.is_complete);
    assert_eq!(progress.status, "1 of 3 projects failed");
    assert_eq!(progress.failures.len(), 1);
    assert_eq!(progress.failures[0].project, "P-2");
    assert_eq!(progress.failures[0].kind, ErrorKind::Copy);

    assert_eq!(source.linked_count("Locations", "P-1").await, 0);
    assert_eq!(source.linked_count("Locations", "P-2").await, 1);
    assert_eq!(source.linked_count(PROJECTS_TABLE, "P-2").await, 1);
    assert_eq!(source.linked_count("Locations", "P-3").await, 0);
    assert_eq!(destination.linked_count("Locations", "P-3").await, 1);
}

#[tokio::test]
async fn test_bulk_counts_skipped_projects_as_success() {
    let source = Arc::new(three_projects());
    // P-2 landed in an earlier run under its own id.
    let destination = Arc::new(
        MemoryStore::builder()
            .with_registry_tables()
            .with_row(
                PROJECTS_TABLE,
                json!({"ID": 3, "LinkID": "P-2", "Name": "Project P-2"}),
            )
            .build(),
    );
    let archiver = Archiver::builder(source.clone(), destination.clone())
        .build()
        .unwrap();

    let (sink, mut rx) = ProgressSink::channel();
    let progress = archiver.archive_all(&sink).await.unwrap();

    assert_eq!(progress.state, RunState::Completed);
    assert!(progress.failures.is_empty());
    assert!(drain(&mut rx)
        .iter()
        .any(|p| p.current_project == "P-2" && p.status == "Project already archived"));
}

#[tokio::test]
async fn test_bulk_forwards_aggregate_counters() {
    let source = Arc::new(three_projects());
    let destination = Arc::new(MemoryStore::builder().build());
    let archiver = Archiver::builder(source.clone(), destination.clone())
        .build()
        .unwrap();

    let (sink, mut rx) = ProgressSink::channel();
    archiver.archive_all(&sink).await.unwrap();

    let snapshots = drain(&mut rx);
    let for_p2: Vec<_> = snapshots
        .iter()
        .filter(|p| p.current_project == "P-2")
        .collect();
    assert!(!for_p2.is_empty());
    assert!(for_p2
        .iter()
        .all(|p| p.projects_processed == 2 && p.total_projects == 3));
    assert!(for_p2.iter().any(|p| p.current_table == "Locations"));
    assert_eq!(snapshots.iter().filter(|p| p.is_complete).count(), 1);
}

#[tokio::test]
async fn test_bulk_aborts_when_projects_cannot_be_listed() {
    let source = Arc::new(MemoryStore::builder().with_fault(Fault::Unreachable).build());
    let destination = Arc::new(MemoryStore::builder().build());
    let archiver = Archiver::builder(source.clone(), destination.clone())
        .build()
        .unwrap();

    let (sink, mut rx) = ProgressSink::channel();
    let err = archiver.archive_all(&sink).await.unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
    let last = drain(&mut rx).pop().unwrap();
    assert_eq!(last.state, RunState::Failed);
    assert!(last.is_complete);
    assert!(destination.writes().await.is_empty());
}

#[tokio::test]
async fn test_bulk_cancel_between_projects() {
    let token = CancellationToken::new();
    let source = Arc::new(
        MemoryStore::builder()
            .with_project("P-1", &[("Attachment", 1)])
            .with_project("P-2", &[("Attachment", 1)])
            .build(),
    );
    let hook_token = token.clone();
    let destination = Arc::new(
        MemoryStore::builder()
            .on_insert(move |t| {
                if t == "Attachment" {
                    hook_token.cancel();
                }
            })
            .build(),
    );
    let archiver = Archiver::builder(source.clone(), destination.clone())
        .with_cancellation(token)
        .build()
        .unwrap();

    let (sink, mut rx) = ProgressSink::channel();
    let err = archiver.archive_all(&sink).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(destination.linked_count(PROJECTS_TABLE, "P-1").await, 1);
    assert_eq!(destination.linked_count(PROJECTS_TABLE, "P-2").await, 0);

    let last = drain(&mut rx).pop().unwrap();
    assert_eq!(last.state, RunState::Cancelled);
    assert_eq!(last.projects_processed, 1);
}

#[tokio::test]
async fn test_bulk_with_no_projects_completes() {
    let source = Arc::new(MemoryStore::builder().with_registry_tables().build());
    let destination = Arc::new(MemoryStore::builder().build());
    let archiver = Archiver::builder(source.clone(), destination.clone())
        .build()
        .unwrap();

    let progress = archiver.archive_all(&ProgressSink::noop()).await.unwrap();
    assert_eq!(progress.state, RunState::Completed);
    assert_eq!(progress.total_projects, 0);
    assert_eq!(archiver.list_project_keys().await.unwrap().len(), 0);
}
