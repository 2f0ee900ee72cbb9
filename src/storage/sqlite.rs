//! Key-value storage trait and SQLite implementation.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::error::{StorageError, StorageResult};

/// Trait for durable key-value backends.
///
/// Values are opaque strings; callers own the encoding.
pub trait KeyValueStore: Send + Sync {
  /// Get the value stored under `key`.
  fn get(&self, key: &str) -> StorageResult<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> StorageResult<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> StorageResult<()>;

  /// Remove every key that starts with `prefix` and contains `fragment`.
  /// Returns the number removed.
  fn remove_matching(&self, prefix: &str, fragment: &str) -> StorageResult<usize>;

  /// Atomically read-modify-write a single key.
  ///
  /// The closure receives the current value and returns the new one;
  /// returning `None` deletes the key. No other operation on this store can
  /// interleave between the read and the write.
  fn update(
    &self,
    key: &str,
    apply: &mut dyn FnMut(Option<String>) -> StorageResult<Option<String>>,
  ) -> StorageResult<()>;
}

/// SQLite-based key-value storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> StorageResult<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let conn = Connection::open(path)?;
    Self::with_connection(conn)
  }

  /// Open a store that lives only as long as this value.
  pub fn open_in_memory() -> StorageResult<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  /// Get the default database path.
  pub fn default_path() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(StorageError::NoDataDir)?;

    Ok(data_dir.join("habit-sync").join("offline.db"))
  }

  fn with_connection(conn: Connection) -> StorageResult<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> StorageResult<()> {
    self.lock()?.execute_batch(SCHEMA)?;
    Ok(())
  }

  fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| StorageError::LockPoisoned)
  }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS offline_store (
    storage_key TEXT PRIMARY KEY,
    blob TEXT NOT NULL
);
"#;

fn select_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(
      "SELECT blob FROM offline_store WHERE storage_key = ?",
      params![key],
      |row| row.get(0),
    )
    .optional()
}

fn upsert_value(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO offline_store (storage_key, blob) VALUES (?, ?)",
    params![key, value],
  )?;
  Ok(())
}

impl KeyValueStore for SqliteStorage {
  fn get(&self, key: &str) -> StorageResult<Option<String>> {
    let conn = self.lock()?;
    Ok(select_value(&conn, key)?)
  }

  fn set(&self, key: &str, value: &str) -> StorageResult<()> {
    let conn = self.lock()?;
    upsert_value(&conn, key, value)?;
    Ok(())
  }

  fn remove(&self, key: &str) -> StorageResult<()> {
    let conn = self.lock()?;
    conn.execute(
      "DELETE FROM offline_store WHERE storage_key = ?",
      params![key],
    )?;
    Ok(())
  }

  fn remove_matching(&self, prefix: &str, fragment: &str) -> StorageResult<usize> {
    let conn = self.lock()?;
    // instr() instead of LIKE: principals may contain '_' or '%'
    let removed = conn.execute(
      "DELETE FROM offline_store WHERE instr(storage_key, ?1) = 1 AND instr(storage_key, ?2) > 0",
      params![prefix, fragment],
    )?;
    Ok(removed)
  }

  fn update(
    &self,
    key: &str,
    apply: &mut dyn FnMut(Option<String>) -> StorageResult<Option<String>>,
  ) -> StorageResult<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    let current = select_value(&tx, key)?;
    match apply(current)? {
      Some(value) => upsert_value(&tx, key, &value)?,
      None => {
        tx.execute(
          "DELETE FROM offline_store WHERE storage_key = ?",
          params![key],
        )?;
      }
    }

    tx.commit()?;
    Ok(())
  }
}
