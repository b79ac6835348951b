//! Store bootstrap: connection setup and schema migrations.
//!
//! # Responsibility
//! - Open and configure the store shared by both boards.
//! - Apply schema migrations in deterministic order.
//! - Classify bootstrap failures with stable `store_*` error codes.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Repositories must not touch data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Store bootstrap and query failures.
#[derive(Debug)]
pub enum DbError {
    /// The store file (or in-memory store) could not be opened.
    Connect(rusqlite::Error),
    /// A pragma or statement failed on an open store.
    Query(rusqlite::Error),
    /// One migration script failed; the store keeps its previous version.
    Migration {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },
    /// The store was written by a newer build.
    SchemaTooNew {
        store_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// Stable code used in `store_open` log lines and host envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "store_connect_failed",
            Self::Query(_) => "store_query_failed",
            Self::Migration { .. } => "store_migration_failed",
            Self::SchemaTooNew { .. } => "store_schema_too_new",
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(err) => write!(f, "cannot open store: {err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Migration {
                version,
                name,
                source,
            } => write!(f, "store migration {version} ({name}) failed: {source}"),
            Self::SchemaTooNew {
                store_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {store_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connect(err) | Self::Query(err) => Some(err),
            Self::Migration { source, .. } => Some(source),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Query(value)
    }
}
