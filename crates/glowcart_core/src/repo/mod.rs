//! Repository layer for client-local state.
//!
//! # Responsibility
//! - Define storage contracts for named JSON slots and binary draft files.
//! - Isolate SQLite details from stores and controllers.
//!
//! # Invariants
//! - Structured slots and binary files use separate tables and separate
//!   contracts; file bytes never pass through JSON.
//! - Read paths reject corrupt persisted data instead of masking it.

pub mod file_repo;
pub mod slot_repo;

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error for slot and file stores.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Connection is missing a required table (migrations not applied).
    NotReady(&'static str),
    /// Slot payload could not be encoded or decoded.
    Serialization {
        slot: String,
        source: serde_json::Error,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotReady(table) => {
                write!(f, "local store is not ready: missing table `{table}`")
            }
            Self::Serialization { slot, source } => {
                write!(f, "slot `{slot}` payload is not valid: {source}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization { source, .. } => Some(source),
            Self::NotReady(_) | Self::InvalidData(_) => None,
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

pub(crate) fn ensure_table(conn: &rusqlite::Connection, table: &'static str) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Ok(())
    } else {
        Err(RepoError::NotReady(table))
    }
}
