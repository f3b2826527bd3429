//! Live PostgreSQL tests for the source, destination and purge stores.
//!
//! Ignored by default. Run with a reachable database:
//!
//! ```text
//! DATABASE_URL=postgres://... cargo test -p mvarchive-db -- --ignored
//! ```
//!
//! Each test works in two private schemas, one playing the operational
//! database and one the archive.

use std::sync::Arc;

use mvarchive_core::{
    BatchWindow, DestinationStore, Error, ProjectKey, RunState, SourceStore, PROJECTS_TABLE,
    PROJECT_TABLES,
};
use mvarchive_db::test_fixtures::TestDatabase;
use mvarchive_engine::{Archiver, ProgressSink};

// ============================================================================
// HELPERS
// ============================================================================

async fn setup() -> TestDatabase {
    dotenvy::dotenv().ok();
    let db = TestDatabase::new().await;

    db.exec_source(
        r#"CREATE TABLE "Projects" (
            "ID" integer PRIMARY KEY,
            "LinkID" character varying(50) NOT NULL,
            "Name" text,
            "Budget" numeric(18,4) DEFAULT 0
        )"#,
    )
    .await;

    for spec in PROJECT_TABLES {
        let payload = if spec.binary_payload {
            r#", "Payload" bytea"#
        } else {
            ""
        };
        db.exec_source(&format!(
            r#"CREATE TABLE "{}" (
                "ID" integer PRIMARY KEY,
                "LinkIDProject" character varying(50) NOT NULL,
                "Name" character varying(120){}
            )"#,
            spec.name, payload
        ))
        .await;
    }
    db
}

async fn seed_project(db: &TestDatabase, id: i32, key: &str) {
    db.exec_source(&format!(
        r#"INSERT INTO "Projects" VALUES ({id}, '{key}', 'Project {key}', 1250.5)"#
    ))
    .await;
}

/// `count` rows for `key` starting at `first_id`.
async fn seed_rows(db: &TestDatabase, table: &str, key: &str, first_id: i32, count: i32) {
    let binary = PROJECT_TABLES
        .iter()
        .any(|t| t.name == table && t.binary_payload);
    let payload = if binary {
        ", decode(md5(g::text), 'hex')"
    } else {
        ""
    };
    db.exec_source(&format!(
        r#"INSERT INTO "{table}"
           SELECT g, '{key}', '{table} ' || g{payload}
           FROM generate_series({first_id}, {last}) g"#,
        last = first_id + count - 1
    ))
    .await;
}

async fn payload_digest(db: &TestDatabase, schema: &str, table: &str) -> Option<String> {
    sqlx::query_scalar(&format!(
        r#"SELECT md5(string_agg(encode("Payload", 'hex'), '' ORDER BY "ID"))
           FROM "{schema}"."{table}""#
    ))
    .fetch_one(&db.pool)
    .await
    .expect("Failed to digest payloads")
}

fn archiver(db: &TestDatabase, dry_run: bool) -> Archiver {
    let source = Arc::new(db.source());
    let mut builder = Archiver::builder(source, Arc::new(db.destination())).dry_run(dry_run);
    if !dry_run {
        builder = builder.with_purge(Arc::new(db.purger()));
    }
    builder.build().expect("Failed to build archiver")
}

// ============================================================================
// STORE TESTS
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_source_reads_catalog_and_pages() {
    let db = setup().await;
    seed_project(&db, 1, "P-1").await;
    seed_rows(&db, "Parts", "P-1", 1, 25).await;
    seed_rows(&db, "Parts", "P-2", 100, 5).await;
    let source = db.source();
    let key = ProjectKey::new("P-1").unwrap();

    let columns = source.table_columns("Parts").await.unwrap();
    let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["ID", "LinkIDProject", "Name"]);
    assert!(columns[0].is_primary_key);
    assert_eq!(columns[2].character_maximum_length, Some(120));

    assert_eq!(source.count_linked_rows("Parts", &key).await.unwrap(), 25);
    assert_eq!(source.list_project_keys().await.unwrap(), vec!["P-1".to_string()]);

    let window = BatchWindow { offset: 20, size: 10 };
    let batch = source.fetch_linked_batch("Parts", &key, window).await.unwrap();
    assert_eq!(batch.len(), 5);
    assert_eq!(batch.rows[0]["ID"], 21);

    let past_end = BatchWindow { offset: 30, size: 10 };
    assert!(source
        .fetch_linked_batch("Parts", &key, past_end)
        .await
        .unwrap()
        .is_empty());

    assert!(source.table_columns("Ghost").await.unwrap().is_empty());
    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_destination_project_exists_without_projects_table() {
    let db = setup().await;
    let destination = db.destination();
    let key = ProjectKey::new("P-1").unwrap();

    assert!(!destination.project_exists(&key).await.unwrap());
    assert!(!destination.table_exists(PROJECTS_TABLE).await.unwrap());
    db.cleanup().await;
}

// ============================================================================
// END TO END
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_archive_p100_with_binary_payloads() {
    let db = setup().await;
    seed_project(&db, 1, "P-100").await;
    seed_rows(&db, "Locations", "P-100", 1, 2).await;
    seed_rows(&db, "CutPartsFiles", "P-100", 1, 3500).await;
    seed_rows(&db, "Locations", "P-200", 10, 3).await;
    seed_project(&db, 2, "P-200").await;
    let before = payload_digest(&db, &db.source_schema, "CutPartsFiles").await;

    let progress = archiver(&db, false)
        .archive_project("P-100", &ProgressSink::noop())
        .await
        .unwrap();
    assert!(progress.is_complete);

    let (src, dst) = (db.source_schema.clone(), db.destination_schema.clone());
    assert_eq!(db.count(&dst, "Locations").await, 2);
    assert_eq!(db.count(&dst, "CutPartsFiles").await, 3500);
    assert_eq!(db.count(&dst, PROJECTS_TABLE).await, 1);
    assert_eq!(db.count(&src, "CutPartsFiles").await, 0);
    assert_eq!(db.count(&src, "Locations").await, 3);
    assert_eq!(db.count(&src, PROJECTS_TABLE).await, 1);
    assert_eq!(payload_digest(&db, &dst, "CutPartsFiles").await, before);

    let budget: String = sqlx::query_scalar(&format!(
        r#"SELECT "Budget"::text FROM "{dst}"."Projects""#
    ))
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(budget, "1250.5000");

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_rerun_after_failed_table_is_skipped() {
    let db = setup().await;
    seed_project(&db, 1, "P-1").await;
    seed_rows(&db, "Parts", "P-1", 1, 10).await;
    // An older archive copy of Parts without the Name column.
    db.exec_destination(
        r#"CREATE TABLE "Parts" (
            "ID" integer PRIMARY KEY,
            "LinkIDProject" character varying(50) NOT NULL
        )"#,
    )
    .await;

    let err = archiver(&db, false)
        .archive_project("P-1", &ProgressSink::noop())
        .await
        .unwrap_err();
    match err {
        Error::Copy { table, message } => {
            assert_eq!(table, "Parts");
            assert!(message.contains("Name"));
        }
        other => panic!("Expected Copy error, got {other:?}"),
    }

    let (src, dst) = (db.source_schema.clone(), db.destination_schema.clone());
    assert_eq!(db.count(&dst, PROJECTS_TABLE).await, 1);

    let progress = archiver(&db, false)
        .archive_project("P-1", &ProgressSink::noop())
        .await
        .unwrap();
    assert_eq!(progress.state, RunState::Skipped);
    assert_eq!(db.count(&dst, "Parts").await, 0);
    assert_eq!(db.count(&src, "Parts").await, 10);
    assert_eq!(db.count(&src, PROJECTS_TABLE).await, 1);

    db.cleanup().await;
}
