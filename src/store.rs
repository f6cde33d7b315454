//! Local record store trait and SQLite implementation.
//!
//! Records are arbitrary JSON documents keyed by their `key_path`. The
//! whole set is replaced on each successful refresh; synthetic endpoints
//! read from it on demand.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// Trait for the durable local key-value store backing synthetic endpoints.
pub trait LocalStore: Send + Sync {
  /// All record keys, in sorted order.
  fn keys(&self) -> Result<Vec<String>>;

  /// Get a single record by key.
  fn get(&self, key: &str) -> Result<Option<Value>>;

  /// Insert or replace a single record.
  fn put(&self, key: &str, value: &Value) -> Result<()>;

  /// Remove every record.
  fn clear(&self) -> Result<()>;
}

/// SQLite-backed record store.
pub struct SqliteLocalStore {
  conn: Mutex<Connection>,
}

/// Schema for the record table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS local_records (
    key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteLocalStore {
  /// Open (or create) a record store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open record store at {}: {}", path.display(), e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run record store migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }
}

impl LocalStore for SqliteLocalStore {
  fn keys(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT key FROM local_records ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query record keys: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }

  fn get(&self, key: &str) -> Result<Option<Value>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT data FROM local_records WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let data: Option<Vec<u8>> = stmt.query_row(params![key], |row| row.get(0)).ok();

    match data {
      Some(data) => {
        let value = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to parse record {}: {}", key, e))?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  fn put(&self, key: &str, value: &Value) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize record: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO local_records (key, data, stored_at)
         VALUES (?, ?, datetime('now'))",
        params![key, data],
      )
      .map_err(|e| eyre!("Failed to store record: {}", e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM local_records", [])
      .map_err(|e| eyre!("Failed to clear record store: {}", e))?;

    Ok(())
  }
}

/// In-memory record store. Used in tests and when no durable storage is
/// wanted.
#[derive(Default)]
pub struct MemoryLocalStore {
  records: Mutex<BTreeMap<String, Value>>,
}

impl MemoryLocalStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl LocalStore for MemoryLocalStore {
  fn keys(&self) -> Result<Vec<String>> {
    let records = self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(records.keys().cloned().collect())
  }

  fn get(&self, key: &str) -> Result<Option<Value>> {
    let records = self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(records.get(key).cloned())
  }

  fn put(&self, key: &str, value: &Value) -> Result<()> {
    let mut records = self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    records.insert(key.to_string(), value.clone());
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let mut records = self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    records.clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn roundtrip(store: &dyn LocalStore) {
    store.put("a", &json!({"key_path": "a", "value": 1})).unwrap();
    store.put("b", &json!({"key_path": "b"})).unwrap();

    assert_eq!(store.keys().unwrap(), vec!["a", "b"]);
    assert_eq!(
      store.get("a").unwrap(),
      Some(json!({"key_path": "a", "value": 1}))
    );
    assert_eq!(store.get("missing").unwrap(), None);

    // Replacement keeps a single entry per key.
    store.put("a", &json!({"key_path": "a", "value": 2})).unwrap();
    assert_eq!(
      store.get("a").unwrap(),
      Some(json!({"key_path": "a", "value": 2}))
    );
    assert_eq!(store.keys().unwrap().len(), 2);

    store.clear().unwrap();
    assert!(store.keys().unwrap().is_empty());
    assert_eq!(store.get("a").unwrap(), None);
  }

  #[test]
  fn memory_store_roundtrip() {
    roundtrip(&MemoryLocalStore::new());
  }

  #[test]
  fn sqlite_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteLocalStore::open(&dir.path().join("records.db")).unwrap();
    roundtrip(&store);
  }

  #[test]
  fn sqlite_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");
    {
      let store = SqliteLocalStore::open(&path).unwrap();
      store.put("a", &json!(1)).unwrap();
    }
    let store = SqliteLocalStore::open(&path).unwrap();
    assert_eq!(store.get("a").unwrap(), Some(json!(1)));
  }
}
