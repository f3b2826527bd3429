//! Tracing subscriber setup.
//!
//! Environment variables:
//!   LOG_FORMAT  - "json" or "text" (default: "text")
//!   LOG_FILE    - path to log file (optional, enables daily-rolling file logging)
//!   LOG_ANSI    - "true"/"false" override ANSI colors
//!   RUST_LOG    - standard env filter (default: "mvarchive=info")
//!
//! Console logs go to stderr; stdout carries command output.

use std::path::{Path, PathBuf};

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;

pub const DEFAULT_FILTER: &str = "mvarchive=info";

const DEFAULT_LOG_FILE_NAME: &str = "mvarchive.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub json: bool,
    pub file: Option<PathBuf>,
    /// Colors on or off. Defaults to on for the console, off for files.
    pub ansi: bool,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let json = lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json"));
        let file = lookup("LOG_FILE")
            .filter(|f| !f.trim().is_empty())
            .map(PathBuf::from);
        let ansi = lookup("LOG_ANSI")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(file.is_none());
        Self { json, file, ansi }
    }

    /// Directory and file name for the daily-rolling appender.
    fn file_target(path: &Path) -> (&Path, &str) {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(DEFAULT_LOG_FILE_NAME);
        (dir, name)
    }
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init() -> Option<WorkerGuard> {
    let settings = LogSettings::from_env();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let (writer, guard) = match settings.file {
        Some(ref path) => {
            let (dir, name) = LogSettings::file_target(path);
            let appender = tracing_appender::rolling::daily(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(settings.ansi);
    let registry = tracing_subscriber::registry().with(env_filter);
    if settings.json {
        registry.with(layer.json()).init();
    } else {
        registry.with(layer).init();
    }

    let log_file = settings
        .file
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(stderr)".to_string());
    info!(json = settings.json, log_file = %log_file, "Logging initialized");
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_are_colored_text_on_console() {
        assert_eq!(
            settings(&[]),
            LogSettings {
                json: false,
                file: None,
                ansi: true
            }
        );
    }

    #[test]
    fn test_file_logging_disables_colors_unless_asked() {
        let s = settings(&[("LOG_FILE", "/var/log/mvarchive/run.log")]);
        assert_eq!(s.file, Some(PathBuf::from("/var/log/mvarchive/run.log")));
        assert!(!s.ansi);

        let s = settings(&[("LOG_FILE", "run.log"), ("LOG_ANSI", "1")]);
        assert!(s.ansi);
    }

    #[test]
    fn test_json_format_and_blank_file() {
        let s = settings(&[("LOG_FORMAT", "JSON"), ("LOG_FILE", "  ")]);
        assert!(s.json);
        assert_eq!(s.file, None);
    }

    #[test]
    fn test_file_target_splits_dir_and_name() {
        let (dir, name) = LogSettings::file_target(Path::new("/var/log/mvarchive/run.log"));
        assert_eq!(dir, Path::new("/var/log/mvarchive"));
        assert_eq!(name, "run.log");

        let (dir, name) = LogSettings::file_target(Path::new("run.log"));
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "run.log");
    }
}
