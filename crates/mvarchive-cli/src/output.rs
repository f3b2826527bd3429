//! Rendering command results and progress snapshots.

use std::fmt::Write as _;

use clap::ValueEnum;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use mvarchive_core::{deletion_order, ArchiveProgress, PROJECTS_TABLE, PROJECT_TABLES};
use mvarchive_engine::ConnectionReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON document per line
    Json,
}

/// One line for a progress snapshot.
pub fn progress_line(p: &ArchiveProgress) -> String {
    let mut line = String::new();
    if p.total_projects > 1 {
        let _ = write!(line, "[{}/{}] ", p.projects_processed, p.total_projects);
    }
    if !p.current_project.is_empty() {
        let _ = write!(line, "{}: ", p.current_project);
    }
    line.push_str(&p.status);
    if !p.is_complete && p.total_records > 0 {
        let _ = write!(
            line,
            " ({}/{} rows, table {}/{})",
            p.current_record, p.total_records, p.tables_processed, p.total_tables
        );
    }
    line
}

/// Failure summary lines for a finished run.
pub fn summary_lines(p: &ArchiveProgress) -> Vec<String> {
    p.failures
        .iter()
        .map(|f| format!("  {} [{}] {}", f.project, f.kind, f.error))
        .collect()
}

/// Print snapshots from `rx` until every sender is gone.
pub fn spawn_printer(
    format: OutputFormat,
    mut rx: UnboundedReceiver<ArchiveProgress>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            match format {
                OutputFormat::Text => println!("{}", progress_line(&p)),
                OutputFormat::Json => match serde_json::to_string(&p) {
                    Ok(json) => println!("{json}"),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialise progress"),
                },
            }
        }
    })
}

pub fn connection_report(report: &ConnectionReport) -> String {
    let side = |ok: bool, error: &Option<String>| match (ok, error) {
        (true, _) => "ok".to_string(),
        (false, Some(e)) => format!("FAILED: {e}"),
        (false, None) => "FAILED".to_string(),
    };
    format!(
        "source: {}\ndestination: {}",
        side(report.source_ok, &report.source_error),
        side(report.destination_ok, &report.destination_error)
    )
}

/// The table registry with copy and deletion order.
pub fn tables_text() -> String {
    let mut out = String::from("Copy order:\n");
    let _ = writeln!(out, "  {:>2}. {}", 1, PROJECTS_TABLE);
    for (i, spec) in PROJECT_TABLES.iter().enumerate() {
        let flag = if spec.binary_payload { "  [binary]" } else { "" };
        let _ = writeln!(out, "  {:>2}. {}{}", i + 2, spec.name, flag);
    }
    out.push_str("\nDeletion order:\n");
    for (i, name) in deletion_order().iter().enumerate() {
        let _ = writeln!(out, "  {:>2}. {}", i + 1, name);
    }
    out
}

pub fn tables_json() -> serde_json::Value {
    serde_json::json!({
        "projects_table": PROJECTS_TABLE,
        "tables": PROJECT_TABLES,
        "deletion_order": deletion_order(),
    })
}
