//! Blob store for pending booking attachments.
//!
//! # Responsibility
//! - Persist raw attachment bytes keyed by scope (service id).
//! - Keep binary data out of the JSON slot path.
//!
//! # Invariants
//! - `replace_files` swaps the whole file set of a scope in one transaction.
//! - Files of a scope are returned in the order they were saved.
//! - Persisted `size_bytes` always matches the stored blob length.

use crate::model::draft::DraftFile;
use crate::repo::{ensure_table, RepoError, RepoResult};
use rusqlite::{params, Connection};

/// Binary-capable storage contract for draft attachments.
pub trait FileStore {
    /// Replaces every file stored under `scope_id`.
    fn replace_files(&self, scope_id: &str, files: &[DraftFile]) -> RepoResult<()>;
    /// Lists files for `scope_id`; empty when none exist.
    fn list_files(&self, scope_id: &str) -> RepoResult<Vec<DraftFile>>;
    /// Deletes files for `scope_id`, returning how many were removed.
    fn delete_files(&self, scope_id: &str) -> RepoResult<usize>;
    /// Lists scopes that currently hold files.
    fn list_scopes(&self) -> RepoResult<Vec<String>>;
}

/// SQLite-backed file store over the `draft_files` table.
pub struct SqliteFileStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFileStore<'conn> {
    /// Constructs a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table(conn, "draft_files")?;
        Ok(Self { conn })
    }
}

impl FileStore for SqliteFileStore<'_> {
    fn replace_files(&self, scope_id: &str, files: &[DraftFile]) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM draft_files WHERE scope_id = ?1;", [scope_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO draft_files (scope_id, position, name, mime_type, size_bytes, bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            )?;
            for (position, file) in files.iter().enumerate() {
                let size = i64::try_from(file.bytes.len()).map_err(|_| {
                    RepoError::InvalidData(format!("attachment `{}` is too large", file.name))
                })?;
                insert.execute(params![
                    scope_id,
                    position as i64,
                    file.name.as_str(),
                    file.mime_type.as_str(),
                    size,
                    file.bytes.as_slice(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn list_files(&self, scope_id: &str) -> RepoResult<Vec<DraftFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, mime_type, size_bytes, bytes
             FROM draft_files
             WHERE scope_id = ?1
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query([scope_id])?;
        let mut files = Vec::new();

        while let Some(row) = rows.next()? {
            let name: String = row.get("name")?;
            let size: i64 = row.get("size_bytes")?;
            let bytes: Vec<u8> = row.get("bytes")?;
            if usize::try_from(size).ok() != Some(bytes.len()) {
                return Err(RepoError::InvalidData(format!(
                    "attachment `{name}` in scope `{scope_id}` has size {size} but {} stored bytes",
                    bytes.len()
                )));
            }
            files.push(DraftFile {
                name,
                mime_type: row.get("mime_type")?,
                bytes,
            });
        }

        Ok(files)
    }

    fn delete_files(&self, scope_id: &str) -> RepoResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM draft_files WHERE scope_id = ?1;", [scope_id])?;
        Ok(removed)
    }

    fn list_scopes(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT scope_id FROM draft_files ORDER BY scope_id ASC;")?;
        let scopes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scopes)
    }
}

impl<T: FileStore + ?Sized> FileStore for &T {
    fn replace_files(&self, scope_id: &str, files: &[DraftFile]) -> RepoResult<()> {
        (**self).replace_files(scope_id, files)
    }

    fn list_files(&self, scope_id: &str) -> RepoResult<Vec<DraftFile>> {
        (**self).list_files(scope_id)
    }

    fn delete_files(&self, scope_id: &str) -> RepoResult<usize> {
        (**self).delete_files(scope_id)
    }

    fn list_scopes(&self) -> RepoResult<Vec<String>> {
        (**self).list_scopes()
    }
}
