//! SQLite-backed store.
//!
//! Every process that opens the same file sees the same backlog, worker maps
//! and markers, which is what lets a restarted orchestrator pick up where the
//! previous one stopped.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{KeyValueStore, StoreError};

/// SQLite-backed key/value store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_lists (
                list TEXT NOT NULL,
                position INTEGER NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (list, position)
            );

            CREATE TABLE IF NOT EXISTS kv_hashes (
                hash TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (hash, field)
            );

            CREATE TABLE IF NOT EXISTS kv_flags (
                key TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_kv_flags_expires_at ON kv_flags(expires_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite store lock poisoned".to_string()))
    }

    /// Insert at one end of a list. `head` picks the end.
    fn push(&self, list: &str, value: &str, head: bool) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let position: i64 = if head {
            tx.query_row(
                "SELECT COALESCE(MIN(position), 0) - 1 FROM kv_lists WHERE list = ?",
                params![list],
                |row| row.get(0),
            )?
        } else {
            tx.query_row(
                "SELECT COALESCE(MAX(position), 0) + 1 FROM kv_lists WHERE list = ?",
                params![list],
                |row| row.get(0),
            )?
        };

        tx.execute(
            "INSERT INTO kv_lists (list, position, value) VALUES (?, ?, ?)",
            params![list, position, value],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM kv_lists WHERE list = ?",
            params![list],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn list_push_tail(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.push(list, value, false)
    }

    fn list_push_head(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.push(list, value, true)
    }

    fn list_pop_head(&self, list: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let head: Option<(i64, String)> = tx
            .query_row(
                "SELECT position, value FROM kv_lists WHERE list = ? ORDER BY position ASC LIMIT 1",
                params![list],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((position, _)) = &head {
            tx.execute(
                "DELETE FROM kv_lists WHERE list = ? AND position = ?",
                params![list, position],
            )?;
        }
        tx.commit()?;

        Ok(head.map(|(_, value)| value))
    }

    fn list_get(&self, list: &str, index: usize) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_lists WHERE list = ? ORDER BY position ASC LIMIT 1 OFFSET ?",
                params![list, index as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn hash_set(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv_hashes (hash, field, value) VALUES (?, ?, ?)
             ON CONFLICT(hash, field) DO UPDATE SET value = excluded.value",
            params![hash, field, value],
        )?;
        Ok(())
    }

    fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_hashes WHERE hash = ? AND field = ?",
                params![hash, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn hash_get_all(&self, hash: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT field, value FROM kv_hashes WHERE hash = ?")?;
        let rows = stmt.query_map(params![hash], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut fields = BTreeMap::new();
        for row in rows {
            let (field, value) = row?;
            fields.insert(field, value);
        }
        Ok(fields)
    }

    fn set_flag(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        let expires_at = now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));

        let conn = self.lock()?;
        conn.execute("DELETE FROM kv_flags WHERE expires_at <= ?", params![now])?;
        conn.execute(
            "INSERT INTO kv_flags (key, expires_at) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET expires_at = excluded.expires_at",
            params![key, expires_at],
        )?;
        Ok(())
    }

    fn has_flag(&self, key: &str) -> Result<bool, StoreError> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM kv_flags WHERE key = ? AND expires_at > ?",
                params![key, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_order() {
        let store = SqliteStore::in_memory().unwrap();
        store.list_push_tail("q", "a").unwrap();
        store.list_push_tail("q", "b").unwrap();
        store.list_push_head("q", "urgent").unwrap();
        store.list_push_head("q", "more-urgent").unwrap();

        assert_eq!(store.list_len("q").unwrap(), 4);
        assert_eq!(store.list_get("q", 1).unwrap().as_deref(), Some("urgent"));

        let drained: Vec<String> = std::iter::from_fn(|| store.list_pop_head("q").unwrap()).collect();
        assert_eq!(drained, vec!["more-urgent", "urgent", "a", "b"]);
        assert_eq!(store.list_len("q").unwrap(), 0);
    }

    #[test]
    fn test_lists_are_independent() {
        let store = SqliteStore::in_memory().unwrap();
        store.list_push_tail("one", "x").unwrap();
        store.list_push_tail("two", "y").unwrap();

        assert_eq!(store.list_pop_head("one").unwrap().as_deref(), Some("x"));
        assert_eq!(store.list_pop_head("one").unwrap(), None);
        assert_eq!(store.list_len("two").unwrap(), 1);
    }

    #[test]
    fn test_hash_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        store.hash_set("solver_status", "1", "p1").unwrap();
        store.hash_set("solver_status", "1", "").unwrap();
        store.hash_set("solver_status", "2", "p2").unwrap();

        assert_eq!(
            store.hash_get("solver_status", "1").unwrap().as_deref(),
            Some("")
        );
        let all = store.hash_get_all("solver_status").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("2").map(String::as_str), Some("p2"));
        assert!(store.hash_get_all("other").unwrap().is_empty());
    }

    #[test]
    fn test_flags_expire() {
        let store = SqliteStore::in_memory().unwrap();
        store.set_flag("short", Duration::from_millis(1)).unwrap();
        store.set_flag("long", Duration::from_secs(3600)).unwrap();

        std::thread::sleep(Duration::from_millis(20));

        assert!(!store.has_flag("short").unwrap());
        assert!(store.has_flag("long").unwrap());
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.list_push_tail("problems_buffer", "{}").unwrap();
            store.hash_set("active_requests", "3", "{}").unwrap();
            store
                .set_flag("problem:p1:deleted", Duration::from_secs(60))
                .unwrap();
        }

        let reopened = SqliteStore::new(&path).unwrap();
        assert_eq!(reopened.list_len("problems_buffer").unwrap(), 1);
        assert!(reopened.hash_get("active_requests", "3").unwrap().is_some());
        assert!(reopened.has_flag("problem:p1:deleted").unwrap());
        assert!(reopened.ping().is_ok());
    }
}
