//! Snapshot store: SQLite connection bootstrap and schema versions.
//!
//! # Responsibility
//! - Hand out connections whose `snapshots` table is at the latest schema.
//! - Report stores written by a newer pkview release instead of touching them.
//!
//! # Invariants
//! - The store schema version lives in `PRAGMA user_version`.
//! - Snapshot rows are only read or written through migrated connections.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};
pub use rusqlite::Connection;

pub type DbResult<T> = Result<T, DbError>;

/// Snapshot store failures.
#[derive(Debug)]
pub enum DbError {
    /// The store file could not be opened at `path`.
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    /// Statement or migration failure on an open store.
    Sqlite(rusqlite::Error),
    /// The store was migrated by a newer release and is left untouched.
    NewerStore {
        store_version: u32,
        supported_version: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "cannot open snapshot store {}: {source}", path.display())
            }
            Self::Sqlite(err) => write!(f, "snapshot store query failed: {err}"),
            Self::NewerStore {
                store_version,
                supported_version,
            } => write!(
                f,
                "snapshot store uses schema v{store_version}; this build reads up to v{supported_version}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Open { source, .. } => Some(source),
            Self::Sqlite(err) => Some(err),
            Self::NewerStore { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
