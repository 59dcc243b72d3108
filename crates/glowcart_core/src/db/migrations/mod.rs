//! Schema steps for the on-device storefront database.
//!
//! # Responsibility
//! - List the named schema steps behind the slot and draft-file stores.
//! - Bring a connection from its recorded version to the latest in one
//!   transaction, reporting which step failed.
//!
//! # Invariants
//! - Step versions start at 1 and increase by exactly one.
//! - `PRAGMA user_version` equals the last step applied.
//! - A database written by a newer build is never touched.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "kv_slots",
        sql: include_str!("0001_kv_slots.sql"),
    },
    SchemaStep {
        version: 2,
        name: "draft_files",
        sql: include_str!("0002_draft_files.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Version recorded in the database header.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Applies every step newer than the recorded version.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = schema_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }
    if from == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in SCHEMA_STEPS.iter().filter(|step| step.version > from) {
        let applied = tx.execute_batch(step.sql).and_then(|()| {
            tx.execute_batch(&format!("PRAGMA user_version = {};", step.version))
        });
        if let Err(source) = applied {
            error!(
                "event=db_migrate module=db status=error version={} step={} error={source}",
                step.version, step.name
            );
            return Err(DbError::Migration {
                version: step.version,
                name: step.name,
                source,
            });
        }
        info!(
            "event=db_migrate module=db status=step_ok version={} step={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from_version={from} to_version={latest}");
    Ok(())
}
