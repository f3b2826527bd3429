//! Centralized default constants for the archive engine.
//!
//! Shared values live here so the engine, the database layer and the CLI do
//! not grow their own magic numbers.

// =============================================================================
// BATCHING
// =============================================================================

/// Rows copied per batch. Fixed: progress granularity and destination
/// interoperability depend on it.
pub const BATCH_SIZE: u64 = 1000;

/// Column used to order batch scans when a table has no primary key.
pub const FALLBACK_ORDER_COLUMN: &str = "ID";

// =============================================================================
// DATABASE
// =============================================================================

/// Schema holding the archived tables on both sides.
pub const SCHEMA: &str = "public";

/// Default PostgreSQL port used when a config leaves it blank.
pub const PORT: u16 = 5432;

/// Default archive database name.
pub const DESTINATION_DATABASE: &str = "TestArchive";

/// Pool size for each side of an archive run. The engine is sequential, so
/// a handful of connections is plenty.
pub const POOL_MAX_CONNECTIONS: u32 = 4;

// =============================================================================
// STATUS TEXT
// =============================================================================

pub const STATUS_ALREADY_ARCHIVED: &str = "Project already archived";
pub const STATUS_CANCELLED: &str = "Archive cancelled";
pub const STATUS_CLEANING: &str = "Cleaning source database (not dry run)";
