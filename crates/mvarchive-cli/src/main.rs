//! mvarchive - move finished projects from the operational database into
//! the archive database.
//!
//! Usage:
//!   mvarchive check                       Ping both databases
//!   mvarchive projects                    List project keys in the source
//!   mvarchive tables                      Show the table registry
//!   mvarchive archive --project P-100     Archive one project (dry run)
//!   mvarchive archive-all --execute       Archive everything and clean the source

mod logging;
mod output;
mod settings;

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use mvarchive_core::{ArchiveConfig, RunState, SourceStore};
use mvarchive_db::{ArchiveDatabase, PoolConfig};
use mvarchive_engine::{Archiver, ProgressSink};

use output::OutputFormat;
use settings::ConnectionArgs;

/// Exit code for a run stopped by Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "mvarchive")]
#[command(author, version, about = "Project archive engine for Microvellum databases")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Output format for results and progress
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test connectivity to the source and destination databases
    Check {
        /// Seconds to wait for each database
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// List project keys present in the source database
    Projects,

    /// Show the table registry with copy and deletion order
    Tables,

    /// Archive a single project
    Archive {
        /// Project key (LinkID)
        #[arg(short, long)]
        project: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Archive every project in the source database
    ArchiveAll {
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct RunArgs {
    /// Delete archived rows from the source database
    #[arg(long, conflicts_with = "dry_run")]
    execute: bool,

    /// Copy only; never touch the source (the default)
    #[arg(long)]
    dry_run: bool,

    /// Skip the confirmation prompt when deleting from the source
    #[arg(short, long)]
    yes: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut ArchiveConfig) {
        if self.execute {
            config.dry_run = false;
        } else if self.dry_run {
            config.dry_run = true;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let format = cli.format;
    match cli.command {
        Commands::Tables => {
            match format {
                OutputFormat::Text => print!("{}", output::tables_text()),
                OutputFormat::Json => println!("{}", output::tables_json()),
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Check { timeout } => {
            let config = cli.connection.resolve()?;
            let pool_config = PoolConfig::new()
                .max_connections(1)
                .connect_timeout(Duration::from_secs(timeout));
            let db = ArchiveDatabase::connect_lazy(&config, pool_config)?;
            let archiver = Archiver::builder(db.source.clone(), db.destination.clone()).build()?;

            let report = archiver.test_connections().await;
            match format {
                OutputFormat::Text => println!("{}", output::connection_report(&report)),
                OutputFormat::Json => println!("{}", serde_json::to_string(&report)?),
            }
            db.close().await;
            Ok(if report.all_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Projects => {
            let config = cli.connection.resolve()?;
            let db = ArchiveDatabase::connect(&config, PoolConfig::new().max_connections(1))
                .await
                .context("Failed to connect")?;
            let keys = db
                .source
                .list_project_keys()
                .await
                .context("Failed to list projects")?;
            match format {
                OutputFormat::Text => keys.iter().for_each(|k| println!("{k}")),
                OutputFormat::Json => println!("{}", serde_json::to_string(&keys)?),
            }
            db.close().await;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Archive { project, run } => {
            let mut config = cli.connection.resolve()?;
            run.apply(&mut config);
            execute(config, run, format, Scope::Project(project)).await
        }

        Commands::ArchiveAll { run } => {
            let mut config = cli.connection.resolve()?;
            run.apply(&mut config);
            execute(config, run, format, Scope::All).await
        }
    }
}

/// What an archive command covers.
enum Scope {
    Project(String),
    All,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Project(key) => write!(f, "project {key}"),
            Scope::All => f.write_str("every project"),
        }
    }
}

/// Shared driver for the archive commands: connect, confirm, wire progress
/// and Ctrl-C, run, and map the outcome to an exit code.
async fn execute(
    config: ArchiveConfig,
    args: RunArgs,
    format: OutputFormat,
    scope: Scope,
) -> Result<ExitCode> {
    config.validate()?;
    if !config.dry_run && !args.yes && !confirm(&config, &scope)? {
        eprintln!("Aborted.");
        return Ok(ExitCode::FAILURE);
    }

    let db = ArchiveDatabase::connect(&config, PoolConfig::default())
        .await
        .context("Failed to connect")?;

    let mut builder = Archiver::builder(db.source.clone(), db.destination.clone())
        .with_config(&config);
    if !config.dry_run {
        builder = builder.with_purge(Arc::new(db.purger()));
    }
    let archiver = builder.build()?;

    let token = archiver.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            token.cancel();
        }
    });

    info!(
        dry_run = config.dry_run,
        source = %config.source().display_target(),
        destination = %config.destination().display_target(),
        "Starting archive of {scope}"
    );

    let (sink, rx) = ProgressSink::channel();
    let printer = output::spawn_printer(format, rx);
    let result = match &scope {
        Scope::Project(key) => archiver.archive_project(key, &sink).await,
        Scope::All => archiver.archive_all(&sink).await,
    };
    // The printer stops once the last sender is gone.
    drop(sink);
    let _ = printer.await;
    db.close().await;

    match result {
        Ok(progress) => {
            if format == OutputFormat::Text {
                for line in output::summary_lines(&progress) {
                    eprintln!("{line}");
                }
            }
            Ok(match progress.state {
                RunState::Failed | RunState::Cancelled => ExitCode::FAILURE,
                RunState::Running | RunState::Completed | RunState::Skipped => ExitCode::SUCCESS,
            })
        }
        Err(e) if e.is_cancelled() => {
            eprintln!("Cancelled.");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(e) => Err(e.into()),
    }
}

/// Ask before deleting anything from the source.
fn confirm(config: &ArchiveConfig, scope: &Scope) -> Result<bool> {
    let mut stderr = io::stderr();
    write!(
        stderr,
        "This archives {scope} to {} and then PERMANENTLY DELETES it from {}.\nType 'yes' to continue: ",
        config.destination().display_target(),
        config.source().display_target()
    )?;
    stderr.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_archive_defaults_to_dry_run() {
        let cli = Cli::try_parse_from(["mvarchive", "archive", "--project", "P-100"]).unwrap();
        let Commands::Archive { project, run } = cli.command else {
            panic!("Expected archive command");
        };
        assert_eq!(project, "P-100");
        let mut config = ArchiveConfig::default();
        run.apply(&mut config);
        assert!(config.dry_run);
    }

    #[test]
    fn test_execute_disables_dry_run() {
        let cli = Cli::try_parse_from(["mvarchive", "archive-all", "--execute", "--yes"]).unwrap();
        let Commands::ArchiveAll { run } = cli.command else {
            panic!("Expected archive-all command");
        };
        assert!(run.yes);
        let mut config = ArchiveConfig::default();
        run.apply(&mut config);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_dry_run_flag_overrides_file() {
        let cli = Cli::try_parse_from(["mvarchive", "archive-all", "--dry-run"]).unwrap();
        let Commands::ArchiveAll { run } = cli.command else {
            panic!("Expected archive-all command");
        };
        let mut config = ArchiveConfig {
            dry_run: false,
            ..Default::default()
        };
        run.apply(&mut config);
        assert!(config.dry_run);
    }

    #[test]
    fn test_execute_conflicts_with_dry_run() {
        assert!(
            Cli::try_parse_from(["mvarchive", "archive-all", "--execute", "--dry-run"]).is_err()
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mvarchive",
            "projects",
            "--format",
            "json",
            "--source-host",
            "db.internal",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.connection.source_host.as_deref(), Some("db.internal"));
    }
}
