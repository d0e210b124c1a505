//! Snapshot repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist captured analysis snapshots under user-facing names.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Each save appends a new revision; earlier revisions are kept.
//! - `sequence` increases by one per name, so "latest" is unambiguous.
//! - Read paths reject undecodable payloads instead of masking them.

use crate::db::DbError;
use crate::graph::snapshot::{Snapshot, SnapshotError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const MAX_SNAPSHOT_NAME_CHARS: usize = 128;

const SNAPSHOT_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    root_type,
    sequence,
    created_at,
    payload
FROM snapshots";

/// Stable identifier of one stored snapshot revision.
pub type SnapshotId = Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Snapshot persistence errors.
#[derive(Debug)]
pub enum RepoError {
    InvalidName(String),
    Db(DbError),
    Snapshot(SnapshotError),
    NotFound(SnapshotId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid snapshot name: `{name}`"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Snapshot(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "snapshot not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted snapshot: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Snapshot(err) => Some(err),
            Self::InvalidName(_) | Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SnapshotError> for RepoError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}

/// Listing row without the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub name: String,
    pub root_type: String,
    pub sequence: i64,
    /// Unix epoch milliseconds.
    pub created_at_ms: i64,
}

/// One stored revision with its decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub summary: SnapshotSummary,
    pub snapshot: Snapshot,
}

/// Repository interface for snapshot persistence.
pub trait SnapshotRepository {
    fn save_snapshot(&self, name: &str, snapshot: &Snapshot) -> RepoResult<SnapshotId>;
    fn get_snapshot(&self, id: SnapshotId) -> RepoResult<Option<StoredSnapshot>>;
    fn latest_snapshot(&self, name: &str) -> RepoResult<Option<StoredSnapshot>>;
    fn list_snapshots(&self) -> RepoResult<Vec<SnapshotSummary>>;
    fn delete_snapshot(&self, id: SnapshotId) -> RepoResult<()>;
}

/// SQLite-backed snapshot repository.
pub struct SqliteSnapshotRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSnapshotRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SnapshotRepository for SqliteSnapshotRepository<'_> {
    fn save_snapshot(&self, name: &str, snapshot: &Snapshot) -> RepoResult<SnapshotId> {
        let name = normalize_name(name)?;
        let id = Uuid::new_v4();
        let payload = snapshot.to_json_string()?;

        self.conn.execute(
            "INSERT INTO snapshots (
                uuid,
                name,
                root_type,
                format_version,
                payload,
                created_at,
                sequence
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, COALESCE(MAX(sequence), 0) + 1
            FROM snapshots
            WHERE name = ?2;",
            params![
                id.to_string(),
                name,
                snapshot.root_type(),
                snapshot.format_version,
                payload,
                snapshot.saved_at_ms,
            ],
        )?;

        Ok(id)
    }

    fn get_snapshot(&self, id: SnapshotId) -> RepoResult<Option<StoredSnapshot>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SNAPSHOT_SELECT_SQL} WHERE uuid = ?1;"))?;
        let row = stmt
            .query_row([id.to_string()], |row| Ok(read_row(row)))
            .optional()?;
        row.transpose()
    }

    fn latest_snapshot(&self, name: &str) -> RepoResult<Option<StoredSnapshot>> {
        let name = normalize_name(name)?;
        let mut stmt = self.conn.prepare(&format!(
            "{SNAPSHOT_SELECT_SQL}
             WHERE name = ?1
             ORDER BY sequence DESC
             LIMIT 1;"
        ))?;
        let row = stmt
            .query_row([name], |row| Ok(read_row(row)))
            .optional()?;
        row.transpose()
    }

    fn list_snapshots(&self) -> RepoResult<Vec<SnapshotSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SNAPSHOT_SELECT_SQL} ORDER BY name ASC, sequence DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            summaries.push(read_summary(row)?);
        }
        Ok(summaries)
    }

    fn delete_snapshot(&self, id: SnapshotId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM snapshots WHERE uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

fn normalize_name(name: &str) -> RepoResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_SNAPSHOT_NAME_CHARS {
        return Err(RepoError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

fn read_summary(row: &Row<'_>) -> RepoResult<SnapshotSummary> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in snapshots.uuid"))
    })?;
    Ok(SnapshotSummary {
        id,
        name: row.get("name")?,
        root_type: row.get("root_type")?,
        sequence: row.get("sequence")?,
        created_at_ms: row.get("created_at")?,
    })
}

fn read_row(row: &Row<'_>) -> RepoResult<StoredSnapshot> {
    let summary = read_summary(row)?;
    let payload: String = row.get("payload")?;
    let snapshot = Snapshot::from_json_str(&payload).map_err(|err| {
        RepoError::InvalidData(format!("payload of snapshot {} is unreadable: {err}", summary.id))
    })?;
    Ok(StoredSnapshot { summary, snapshot })
}
