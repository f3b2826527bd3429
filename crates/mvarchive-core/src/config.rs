//! Archive run configuration.
//!
//! [`ArchiveConfig`] is supplied by an external settings collaborator and is
//! never mutated once a run starts. The core never reads the environment or
//! the filesystem itself.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Connection parameters for both stores plus the dry-run switch.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub source_host: String,
    pub source_port: String,
    pub source_database: String,
    pub source_user: String,
    pub source_password: String,
    pub destination_host: String,
    pub destination_port: String,
    pub destination_database: String,
    pub destination_user: String,
    pub destination_password: String,
    /// When true, source rows are never deleted.
    pub dry_run: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            source_host: String::new(),
            source_port: String::new(),
            source_database: String::new(),
            source_user: String::new(),
            source_password: String::new(),
            destination_host: String::new(),
            destination_port: String::new(),
            destination_database: defaults::DESTINATION_DATABASE.to_string(),
            destination_user: String::new(),
            destination_password: String::new(),
            dry_run: true,
        }
    }
}

impl fmt::Debug for ArchiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveConfig")
            .field("source", &self.source())
            .field("destination", &self.destination())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl ArchiveConfig {
    /// View of the source connection parameters.
    pub fn source(&self) -> StoreConfig<'_> {
        StoreConfig {
            label: "source",
            host: &self.source_host,
            port: &self.source_port,
            database: &self.source_database,
            user: &self.source_user,
            password: &self.source_password,
        }
    }

    /// View of the destination connection parameters.
    pub fn destination(&self) -> StoreConfig<'_> {
        StoreConfig {
            label: "destination",
            host: &self.destination_host,
            port: &self.destination_port,
            database: &self.destination_database,
            user: &self.destination_user,
            password: &self.destination_password,
        }
    }

    /// Check both stores' parameters.
    pub fn validate(&self) -> Result<()> {
        self.source().validate()?;
        self.destination().validate()
    }
}

/// Borrowed connection parameters for one store.
#[derive(Clone, Copy)]
pub struct StoreConfig<'a> {
    /// "source" or "destination", used in error messages.
    pub label: &'static str,
    pub host: &'a str,
    pub port: &'a str,
    pub database: &'a str,
    pub user: &'a str,
    pub password: &'a str,
}

impl fmt::Debug for StoreConfig<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("label", &self.label)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl StoreConfig<'_> {
    /// Port as a number; blank means [`defaults::PORT`].
    pub fn port_number(&self) -> Result<u16> {
        let port = self.port.trim();
        if port.is_empty() {
            return Ok(defaults::PORT);
        }
        port.parse::<u16>().map_err(|_| {
            Error::Config(format!("{} port is not a valid number: '{}'", self.label, port))
        })
    }

    /// Reject configurations that cannot possibly connect.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config(format!("{} host is empty", self.label)));
        }
        if self.database.trim().is_empty() {
            return Err(Error::Config(format!("{} database is empty", self.label)));
        }
        self.port_number()?;
        Ok(())
    }

    /// `postgres://` URL with percent-encoded credentials.
    pub fn connection_url(&self) -> Result<String> {
        self.validate()?;
        let credentials = match (self.user.is_empty(), self.password.is_empty()) {
            (true, _) => String::new(),
            (false, true) => format!("{}@", urlencoding::encode(self.user)),
            (false, false) => format!(
                "{}:{}@",
                urlencoding::encode(self.user),
                urlencoding::encode(self.password)
            ),
        };
        Ok(format!(
            "postgres://{}{}:{}/{}",
            credentials,
            self.host.trim(),
            self.port_number()?,
            urlencoding::encode(self.database.trim())
        ))
    }

    /// `host:port/database`, safe to log.
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}
