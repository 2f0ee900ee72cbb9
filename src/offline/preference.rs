//! Device-wide "save changes while offline" preference.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::storage::KeyValueStore;

/// Not namespaced: the preference belongs to the device, not a principal.
pub const PREFERENCE_KEY: &str = "offline_save_preference";

#[derive(Clone)]
pub struct OfflinePreference {
  store: Arc<dyn KeyValueStore>,
  tx: Arc<watch::Sender<bool>>,
}

impl OfflinePreference {
  /// Load the persisted preference. Missing or unreadable values mean enabled.
  pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
    let enabled = match store.get(PREFERENCE_KEY) {
      Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring unreadable offline preference");
        true
      }),
      Ok(None) => true,
      Err(e) => {
        error!(error = %e, "Failed to read offline preference");
        true
      }
    };

    let (tx, _rx) = watch::channel(enabled);
    Self {
      store,
      tx: Arc::new(tx),
    }
  }

  pub fn is_enabled(&self) -> bool {
    *self.tx.borrow()
  }

  /// Change and persist the preference. Persisting is best-effort.
  pub fn set_enabled(&self, enabled: bool) {
    if let Err(e) = self.store.set(PREFERENCE_KEY, &enabled.to_string()) {
      error!(error = %e, "Failed to save offline preference");
    }
    let changed = self.tx.send_if_modified(|current| {
      let changed = *current != enabled;
      *current = enabled;
      changed
    });
    if changed {
      info!(enabled, "Offline preference changed");
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::SqliteStorage;
  use crate::testing::FailingStore;

  #[test]
  fn test_defaults_to_enabled() {
    let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
    assert!(OfflinePreference::load(store).is_enabled());
  }

  #[test]
  fn test_persists_across_loads() {
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    OfflinePreference::load(store.clone()).set_enabled(false);

    assert_eq!(store.get(PREFERENCE_KEY).unwrap().as_deref(), Some("false"));
    assert!(!OfflinePreference::load(store).is_enabled());
  }

  #[test]
  fn test_unreadable_value_means_enabled() {
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    store.set(PREFERENCE_KEY, "maybe").unwrap();
    assert!(OfflinePreference::load(store).is_enabled());

    let preference = OfflinePreference::load(Arc::new(FailingStore));
    assert!(preference.is_enabled());
    preference.set_enabled(false);
    assert!(!preference.is_enabled());
  }

  #[tokio::test]
  async fn test_changes_are_broadcast() {
    let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let preference = OfflinePreference::load(store);
    let mut rx = preference.subscribe();

    preference.set_enabled(true);
    assert!(!rx.has_changed().unwrap());

    preference.set_enabled(false);
    assert!(rx.has_changed().unwrap());
    assert!(!*rx.borrow_and_update());
  }
}
