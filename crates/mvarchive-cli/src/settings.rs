//! Building an [`ArchiveConfig`] from flags, environment and a config file.
//!
//! Precedence, highest first: explicit flags, environment variables, the
//! `--config` file, built-in defaults. Clap folds the first two together.
//! Destination fields left blank inherit the source's, so a single server
//! holding both databases needs only the source settings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use mvarchive_core::ArchiveConfig;

/// Connection settings shared by every command that touches a database.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// JSON file holding a serialised archive configuration
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, env = "MICROVELLUM_DB_HOST")]
    pub source_host: Option<String>,

    #[arg(long, global = true, env = "MICROVELLUM_DB_PORT")]
    pub source_port: Option<String>,

    #[arg(long, global = true, env = "MICROVELLUM_DB_NAME")]
    pub source_database: Option<String>,

    #[arg(long, global = true, env = "MICROVELLUM_DB_USER")]
    pub source_user: Option<String>,

    #[arg(long, global = true, env = "MICROVELLUM_DB_PASSWORD", hide_env_values = true)]
    pub source_password: Option<String>,

    #[arg(long, global = true, env = "MVARCHIVE_DEST_HOST")]
    pub destination_host: Option<String>,

    #[arg(long, global = true, env = "MVARCHIVE_DEST_PORT")]
    pub destination_port: Option<String>,

    #[arg(long, global = true, env = "MVARCHIVE_DEST_NAME")]
    pub destination_database: Option<String>,

    #[arg(long, global = true, env = "MVARCHIVE_DEST_USER")]
    pub destination_user: Option<String>,

    #[arg(long, global = true, env = "MVARCHIVE_DEST_PASSWORD", hide_env_values = true)]
    pub destination_password: Option<String>,
}

impl ConnectionArgs {
    /// Resolve the final configuration, reading `--config` if given.
    pub fn resolve(&self) -> Result<ArchiveConfig> {
        let base = match &self.config {
            Some(path) => load_file(path)?,
            None => ArchiveConfig::default(),
        };
        Ok(self.overlay(base))
    }

    /// Apply flag and environment values over `base`.
    pub fn overlay(&self, mut config: ArchiveConfig) -> ArchiveConfig {
        set(&mut config.source_host, &self.source_host);
        set(&mut config.source_port, &self.source_port);
        set(&mut config.source_database, &self.source_database);
        set(&mut config.source_user, &self.source_user);
        set(&mut config.source_password, &self.source_password);
        set(&mut config.destination_host, &self.destination_host);
        set(&mut config.destination_port, &self.destination_port);
        set(&mut config.destination_database, &self.destination_database);
        set(&mut config.destination_user, &self.destination_user);
        set(&mut config.destination_password, &self.destination_password);

        inherit(&mut config.destination_host, &config.source_host);
        inherit(&mut config.destination_port, &config.source_port);
        inherit(&mut config.destination_user, &config.source_user);
        inherit(&mut config.destination_password, &config.source_password);
        config
    }
}

fn set(field: &mut String, value: &Option<String>) {
    if let Some(v) = value {
        *field = v.clone();
    }
}

fn inherit(field: &mut String, from: &str) {
    if field.trim().is_empty() {
        *field = from.to_string();
    }
}

/// Read a JSON archive configuration. Missing fields take their defaults.
pub fn load_file(path: &Path) -> Result<ArchiveConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args() -> ConnectionArgs {
        ConnectionArgs {
            source_host: Some("db.internal".into()),
            source_port: Some("5433".into()),
            source_database: Some("microvellum".into()),
            source_user: Some("archiver".into()),
            source_password: Some("secret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_destination_inherits_source_server() {
        let config = args().overlay(ArchiveConfig::default());
        assert_eq!(config.destination_host, "db.internal");
        assert_eq!(config.destination_port, "5433");
        assert_eq!(config.destination_user, "archiver");
        assert_eq!(config.destination_password, "secret");
        assert_eq!(config.destination_database, "TestArchive");
        assert!(config.dry_run);
    }

    #[test]
    fn test_destination_overrides_win() {
        let mut a = args();
        a.destination_host = Some("archive.internal".into());
        a.destination_database = Some("Archive2026".into());
        let config = a.overlay(ArchiveConfig::default());
        assert_eq!(config.destination_host, "archive.internal");
        assert_eq!(config.destination_database, "Archive2026");
        assert_eq!(config.destination_port, "5433");
    }

    #[test]
    fn test_flags_override_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"source_host":"from-file","source_database":"filedb","dry_run":false}}"#
        )
        .unwrap();

        let a = ConnectionArgs {
            config: Some(file.path().to_path_buf()),
            source_host: Some("from-flag".into()),
            ..Default::default()
        };
        let config = a.resolve().unwrap();
        assert_eq!(config.source_host, "from-flag");
        assert_eq!(config.source_database, "filedb");
        assert_eq!(config.destination_host, "from-flag");
        assert!(!config.dry_run);
    }

    #[test]
    fn test_unreadable_file_names_path() {
        let a = ConnectionArgs {
            config: Some(PathBuf::from("/nonexistent/mvarchive.json")),
            ..Default::default()
        };
        let err = a.resolve().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/mvarchive.json"));
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
