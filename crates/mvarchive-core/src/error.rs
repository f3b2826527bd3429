//! Error types for the archive engine.

use std::fmt;

use thiserror::Error;

/// Result type alias using the archive engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for archive operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed input (empty project key, bad CLI argument)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or destination store unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Catalog lookup or table creation failed
    #[error("Schema error on {table}: {message}")]
    Schema { table: String, message: String },

    /// Batch copy failed (fetch, insert, column mapping, duplicate key)
    #[error("Copy error on {table}: {message}")]
    Copy { table: String, message: String },

    /// Source cleanup failed after a successful copy
    #[error("Deletion error on {table}: {message}")]
    Deletion { table: String, message: String },

    /// Project root record missing from the source
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// Cooperative cancellation observed between units of work
    #[error("Archive cancelled")]
    Cancelled,

    /// Unclassified database driver error
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

/// Fieldless discriminant of [`Error`], for matching and run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    Config,
    Connection,
    Schema,
    Copy,
    Deletion,
    ProjectNotFound,
    Cancelled,
    Database,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Config => "config",
            ErrorKind::Connection => "connection",
            ErrorKind::Schema => "schema",
            ErrorKind::Copy => "copy",
            ErrorKind::Deletion => "deletion",
            ErrorKind::ProjectNotFound => "project_not_found",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Database => "database",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Schema error for the given table.
    pub fn schema(table: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Schema {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Copy error for the given table.
    pub fn copy(table: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Copy {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Deletion error for the given table.
    pub fn deletion(table: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Deletion {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Config(_) => ErrorKind::Config,
            Error::Connection(_) => ErrorKind::Connection,
            Error::Schema { .. } => ErrorKind::Schema,
            Error::Copy { .. } => ErrorKind::Copy,
            Error::Deletion { .. } => ErrorKind::Deletion,
            Error::ProjectNotFound(_) => ErrorKind::ProjectNotFound,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Database(_) => ErrorKind::Database,
        }
    }

    /// True for cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Message text without the variant prefix.
    fn detail(&self) -> String {
        match self {
            Error::Schema { message, .. }
            | Error::Copy { message, .. }
            | Error::Deletion { message, .. } => message.clone(),
            Error::Connection(msg) => msg.clone(),
            Error::Database(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// Reclassify a store failure as a schema failure on `table`.
    ///
    /// Driver and connection errors become [`Error::Schema`]; errors that
    /// already carry a specific kind pass through unchanged.
    pub fn into_schema(self, table: &str) -> Self {
        match self {
            Error::Database(_) | Error::Connection(_) | Error::Copy { .. } => {
                Error::schema(table, self.detail())
            }
            other => other,
        }
    }

    /// Reclassify a store failure as a copy failure on `table`.
    pub fn into_copy(self, table: &str) -> Self {
        match self {
            Error::Database(_) | Error::Connection(_) => Error::copy(table, self.detail()),
            other => other,
        }
    }

    /// Reclassify a store failure as a deletion failure on `table`.
    pub fn into_deletion(self, table: &str) -> Self {
        match self {
            Error::Database(_) | Error::Connection(_) | Error::Copy { .. } => {
                Error::deletion(table, self.detail())
            }
            other => other,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => Error::Connection(e.to_string()),
            other => Error::Database(other),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidArgument(e.to_string())
    }
}
