//! Principal-namespaced, versioned JSON envelopes over a `KeyValueStore`.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

use super::error::{StorageError, StorageResult};
use super::sqlite::KeyValueStore;

/// Schema version used when callers don't ask for a specific one.
pub const DEFAULT_VERSION: u32 = 1;

/// Prefix shared by every namespaced key.
const KEY_PREFIX: &str = "offline_v";

/// Build the storage key for `(version, principal, key)`.
///
/// Bumping `version` makes old entries unreachable instead of undecodable.
pub fn storage_key(principal: &str, key: &str, version: u32) -> String {
  format!("{}{}_{}_{}", KEY_PREFIX, version, principal, key)
}

/// A stored value together with its capture time and schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  /// Write time in epoch milliseconds
  pub timestamp: i64,
  pub version: u32,
}

impl<T> CacheEntry<T> {
  /// Capture time as a `DateTime`.
  pub fn captured_at(&self) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
  }
}

/// Namespaced offline storage shared by the query cache and the action queue.
#[derive(Clone)]
pub struct OfflineStorage {
  store: Arc<dyn KeyValueStore>,
}

impl OfflineStorage {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store }
  }

  /// The raw store, for entries that are not principal-scoped.
  pub fn raw(&self) -> &Arc<dyn KeyValueStore> {
    &self.store
  }

  /// Best-effort write; failures are logged.
  pub fn write<T: Serialize>(&self, principal: &str, key: &str, data: &T) {
    self.write_versioned(principal, key, data, DEFAULT_VERSION);
  }

  pub fn write_versioned<T: Serialize>(&self, principal: &str, key: &str, data: &T, version: u32) {
    if let Err(e) = self.try_write(principal, key, data, version) {
      error!(principal, key, version, error = %e, "Failed to write offline data");
    }
  }

  pub fn try_write<T: Serialize>(
    &self,
    principal: &str,
    key: &str,
    data: &T,
    version: u32,
  ) -> StorageResult<()> {
    let blob = encode(data, version)?;
    self.store.set(&storage_key(principal, key, version), &blob)
  }

  /// Read an entry. Missing, corrupt or undecodable data all yield `None`.
  pub fn read<T: DeserializeOwned>(&self, principal: &str, key: &str) -> Option<CacheEntry<T>> {
    self.read_versioned(principal, key, DEFAULT_VERSION)
  }

  pub fn read_versioned<T: DeserializeOwned>(
    &self,
    principal: &str,
    key: &str,
    version: u32,
  ) -> Option<CacheEntry<T>> {
    match self.try_read(principal, key, version) {
      Ok(entry) => entry,
      Err(e) => {
        error!(principal, key, version, error = %e, "Failed to read offline data");
        None
      }
    }
  }

  pub fn try_read<T: DeserializeOwned>(
    &self,
    principal: &str,
    key: &str,
    version: u32,
  ) -> StorageResult<Option<CacheEntry<T>>> {
    match self.store.get(&storage_key(principal, key, version))? {
      Some(blob) => Ok(Some(serde_json::from_str(&blob)?)),
      None => Ok(None),
    }
  }

  pub fn clear(&self, principal: &str, key: &str) {
    self.clear_versioned(principal, key, DEFAULT_VERSION);
  }

  pub fn clear_versioned(&self, principal: &str, key: &str, version: u32) {
    if let Err(e) = self.store.remove(&storage_key(principal, key, version)) {
      error!(principal, key, version, error = %e, "Failed to clear offline data");
    }
  }

  /// Remove every entry of every version belonging to `principal`.
  pub fn clear_all(&self, principal: &str) {
    match self
      .store
      .remove_matching(KEY_PREFIX, &format!("_{}_", principal))
    {
      Ok(removed) => debug!(principal, removed, "Cleared offline data"),
      Err(e) => error!(principal, error = %e, "Failed to clear all offline data"),
    }
  }

  /// Atomically transform the value under `(principal, key)`.
  ///
  /// A missing value starts from `T::default()`. A value that does not
  /// decode is left as it is and reported as `StorageError::Serde`. The new
  /// value is written back with a fresh timestamp.
  pub fn try_update<T, R, F>(&self, principal: &str, key: &str, apply: F) -> StorageResult<R>
  where
    T: Default + Serialize + DeserializeOwned,
    F: FnOnce(&mut T) -> R,
  {
    let storage_key = storage_key(principal, key, DEFAULT_VERSION);
    let mut apply = Some(apply);
    let mut output = None;

    self.store.update(&storage_key, &mut |current| {
      let apply = apply.take().ok_or(StorageError::NotApplied)?;
      let mut data = match current {
        Some(blob) => serde_json::from_str::<CacheEntry<T>>(&blob)?.data,
        None => T::default(),
      };
      output = Some(apply(&mut data));
      encode(&data, DEFAULT_VERSION).map(Some)
    })?;

    output.ok_or(StorageError::NotApplied)
  }
}

fn encode<T: Serialize>(data: &T, version: u32) -> StorageResult<String> {
  #[derive(Serialize)]
  struct Envelope<'a, T> {
    data: &'a T,
    timestamp: i64,
    version: u32,
  }

  Ok(serde_json::to_string(&Envelope {
    data,
    timestamp: Utc::now().timestamp_millis(),
    version,
  })?)
}
