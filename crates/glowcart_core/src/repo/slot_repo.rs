//! Named-slot key/value store for structured client state.
//!
//! # Responsibility
//! - Persist one JSON value per named slot (`cart`, `pending_booking`).
//! - Provide typed load/save helpers on top of the raw string contract.
//!
//! # Invariants
//! - A slot holds at most one value; writes overwrite (last writer wins).
//! - Reading a missing slot returns `None`, never an error.

use crate::repo::{ensure_table, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Slot holding the serialized cart.
pub const CART_SLOT: &str = "cart";
/// Slot holding the single pending booking draft.
pub const PENDING_BOOKING_SLOT: &str = "pending_booking";

/// Raw slot storage contract.
pub trait SlotStore {
    fn read_slot(&self, slot: &str) -> RepoResult<Option<String>>;
    fn write_slot(&self, slot: &str, value: &str) -> RepoResult<()>;
    /// Removes a slot. Returns whether a value existed.
    fn clear_slot(&self, slot: &str) -> RepoResult<bool>;
}

/// Reads and decodes a JSON slot.
pub fn load_json<T: DeserializeOwned>(store: &impl SlotStore, slot: &str) -> RepoResult<Option<T>> {
    let Some(raw) = store.read_slot(slot)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| RepoError::Serialization {
            slot: slot.to_string(),
            source,
        })
}

/// Encodes and writes a JSON slot.
pub fn save_json<T: Serialize>(store: &impl SlotStore, slot: &str, value: &T) -> RepoResult<()> {
    let raw = serde_json::to_string(value).map_err(|source| RepoError::Serialization {
        slot: slot.to_string(),
        source,
    })?;
    store.write_slot(slot, &raw)
}

/// SQLite-backed slot store over the `kv_slots` table.
pub struct SqliteSlotStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSlotStore<'conn> {
    /// Constructs a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table(conn, "kv_slots")?;
        Ok(Self { conn })
    }
}

impl SlotStore for SqliteSlotStore<'_> {
    fn read_slot(&self, slot: &str) -> RepoResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_slots WHERE slot = ?1;",
                [slot],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write_slot(&self, slot: &str, value: &str) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO kv_slots (slot, value) VALUES (?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![slot, value],
        )?;
        Ok(())
    }

    fn clear_slot(&self, slot: &str) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM kv_slots WHERE slot = ?1;", [slot])?;
        Ok(changed > 0)
    }
}

impl<T: SlotStore + ?Sized> SlotStore for &T {
    fn read_slot(&self, slot: &str) -> RepoResult<Option<String>> {
        (**self).read_slot(slot)
    }

    fn write_slot(&self, slot: &str, value: &str) -> RepoResult<()> {
        (**self).write_slot(slot, value)
    }

    fn clear_slot(&self, slot: &str) -> RepoResult<bool> {
        (**self).clear_slot(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::{load_json, save_json, SlotStore, SqliteSlotStore};
    use crate::db::open_db_in_memory;
    use crate::repo::RepoError;
    use rusqlite::Connection;

    #[test]
    fn write_overwrites_and_clear_reports_presence() {
        let conn = open_db_in_memory().expect("open db");
        let store = SqliteSlotStore::try_new(&conn).expect("store");

        assert_eq!(store.read_slot("cart").expect("read"), None);
        store.write_slot("cart", "[1]").expect("write");
        store.write_slot("cart", "[2]").expect("overwrite");
        assert_eq!(store.read_slot("cart").expect("read").as_deref(), Some("[2]"));

        assert!(store.clear_slot("cart").expect("clear"));
        assert!(!store.clear_slot("cart").expect("second clear"));
    }

    #[test]
    fn typed_helpers_roundtrip_and_flag_corruption() {
        let conn = open_db_in_memory().expect("open db");
        let store = SqliteSlotStore::try_new(&conn).expect("store");

        save_json(&store, "numbers", &vec![1_u32, 2, 3]).expect("save");
        let loaded: Option<Vec<u32>> = load_json(&store, "numbers").expect("load");
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        store.write_slot("numbers", "{not json").expect("write raw");
        let err = load_json::<Vec<u32>>(&store, "numbers").expect_err("corrupt slot");
        assert!(matches!(err, RepoError::Serialization { .. }));
    }

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().expect("raw connection");
        let err = SqliteSlotStore::try_new(&conn)
            .err()
            .expect("unmigrated connection must be rejected");
        assert!(matches!(err, RepoError::NotReady("kv_slots")));
    }
}
