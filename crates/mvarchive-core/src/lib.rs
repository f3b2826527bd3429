//! # mvarchive-core
//!
//! Core types, traits, and abstractions for the project archive engine.
//!
//! This crate provides the foundational data structures (configuration,
//! progress snapshots, the canonical table registry, column metadata) and the
//! store traits that the database layer and the engine depend on.

pub mod config;
pub mod ddl;
pub mod defaults;
pub mod error;
pub mod models;
pub mod registry;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{ArchiveConfig, StoreConfig};
pub use ddl::{create_table_statement, quote_ident, render_column_type};
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use registry::{
    deletion_order, table_spec, TableSpec, LINK_COLUMN, PROJECTS_TABLE, PROJECT_KEY_COLUMN,
    PROJECT_TABLES,
};
pub use traits::*;
