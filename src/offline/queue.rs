//! Durable FIFO of offline actions for one principal.

use chrono::Utc;
use tracing::{debug, error};
use uuid::Uuid;

use super::action::{Mutation, OfflineAction};
use crate::storage::{OfflineStorage, StorageError, StorageResult, DEFAULT_VERSION};

/// Logical key of the queue in the offline store.
pub const QUEUE_KEY: &str = "action_queue";

/// The pending actions of a single principal.
///
/// Every operation is one read-modify-write of the whole list, atomic with
/// respect to the underlying store. Reads degrade to an empty queue on
/// storage failure; writes report failures so callers never assume an
/// action was recorded or removed when it wasn't.
#[derive(Clone)]
pub struct OfflineQueue {
  storage: OfflineStorage,
  principal: String,
}

impl OfflineQueue {
  pub fn new(storage: OfflineStorage, principal: impl Into<String>) -> Self {
    Self {
      storage,
      principal: principal.into(),
    }
  }

  pub fn principal(&self) -> &str {
    &self.principal
  }

  /// Append `mutation` to the end of the queue and persist it.
  ///
  /// Mutations with NaN or infinite arguments are refused, since they would
  /// make the stored queue unreadable.
  pub fn enqueue(&self, mutation: Mutation) -> StorageResult<OfflineAction> {
    if let Some(field) = mutation.non_finite_field() {
      return Err(StorageError::NonFinite { field });
    }

    let action = self.modify(|queue| {
      // Keep timestamps non-decreasing even if the wall clock steps back
      let now = Utc::now().timestamp_millis();
      let timestamp = queue.last().map_or(now, |last| now.max(last.timestamp));
      let action = OfflineAction {
        id: Uuid::new_v4().to_string(),
        mutation,
        timestamp,
      };
      queue.push(action.clone());
      action
    })?;

    debug!(
      principal = %self.principal,
      id = %action.id,
      kind = ?action.action_type(),
      "Queued offline action"
    );
    Ok(action)
  }

  /// The head of the queue, without removing it.
  pub fn peek(&self) -> Option<OfflineAction> {
    self.actions().into_iter().next()
  }

  /// Remove and return the head of the queue.
  pub fn dequeue(&self) -> StorageResult<Option<OfflineAction>> {
    self.modify(|queue| (!queue.is_empty()).then(|| queue.remove(0)))
  }

  /// Remove the action with `id`. Returns whether it was present.
  pub fn remove_by_id(&self, id: &str) -> StorageResult<bool> {
    self.modify(|queue| {
      let before = queue.len();
      queue.retain(|action| action.id != id);
      queue.len() != before
    })
  }

  /// All pending actions, oldest first.
  pub fn actions(&self) -> Vec<OfflineAction> {
    self
      .storage
      .read::<Vec<OfflineAction>>(&self.principal, QUEUE_KEY)
      .map(|entry| entry.data)
      .unwrap_or_default()
  }

  pub fn size(&self) -> usize {
    self.actions().len()
  }

  pub fn is_empty(&self) -> bool {
    self.size() == 0
  }

  /// Drop every pending action.
  pub fn clear(&self) {
    self.storage.clear(&self.principal, QUEUE_KEY);
  }

  fn modify<R>(&self, apply: impl FnOnce(&mut Vec<OfflineAction>) -> R) -> StorageResult<R> {
    self
      .storage
      .try_update(&self.principal, QUEUE_KEY, apply)
      .inspect_err(|e| {
        error!(
          principal = %self.principal,
          version = DEFAULT_VERSION,
          error = %e,
          "Failed to update offline queue"
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::{storage_key, SqliteStorage};
  use crate::testing::FailingStore;
  use std::sync::Arc;

  fn queue(principal: &str) -> OfflineQueue {
    let storage = OfflineStorage::new(Arc::new(SqliteStorage::open_in_memory().unwrap()));
    OfflineQueue::new(storage, principal)
  }

  #[test]
  fn test_fifo_order() {
    let queue = queue("p1");
    let a = queue.enqueue(Mutation::add_daily_intake(100.0)).unwrap();
    let b = queue.enqueue(Mutation::add_sleep_log(7.5)).unwrap();
    let c = queue.enqueue(Mutation::add_daily_intake(300.0)).unwrap();

    assert_eq!(queue.size(), 3);
    assert_eq!(queue.peek().unwrap(), a);
    assert_eq!(queue.dequeue().unwrap().unwrap(), a);
    assert_eq!(queue.dequeue().unwrap().unwrap(), b);
    assert_eq!(queue.dequeue().unwrap().unwrap(), c);
    assert_eq!(queue.dequeue().unwrap(), None);
    assert!(queue.peek().is_none());
  }

  #[test]
  fn test_ids_unique_and_timestamps_monotonic() {
    let queue = queue("p1");
    for i in 0..20 {
      queue.enqueue(Mutation::add_daily_intake(i as f64)).unwrap();
    }

    let actions = queue.actions();
    let mut ids: Vec<_> = actions.iter().map(|a| a.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);
    assert!(actions.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
  }

  #[test]
  fn test_remove_by_id_removes_only_that_item() {
    let queue = queue("p1");
    let a = queue.enqueue(Mutation::add_daily_intake(1.0)).unwrap();
    let b = queue.enqueue(Mutation::add_daily_intake(2.0)).unwrap();
    let c = queue.enqueue(Mutation::add_daily_intake(3.0)).unwrap();

    assert!(queue.remove_by_id(&b.id).unwrap());
    assert!(!queue.remove_by_id(&b.id).unwrap());
    assert_eq!(queue.actions(), vec![a, c]);
  }

  #[test]
  fn test_clear() {
    let queue = queue("p1");
    queue.enqueue(Mutation::add_sleep_log(8.0)).unwrap();
    queue.clear();
    assert!(queue.is_empty());
  }

  #[test]
  fn test_queues_are_per_principal() {
    let storage = OfflineStorage::new(Arc::new(SqliteStorage::open_in_memory().unwrap()));
    let a = OfflineQueue::new(storage.clone(), "A");
    let b = OfflineQueue::new(storage, "B");

    a.enqueue(Mutation::add_daily_intake(250.0)).unwrap();
    assert_eq!(a.size(), 1);
    assert_eq!(b.size(), 0);
  }

  #[test]
  fn test_large_durations_survive_the_queue() {
    let queue = queue("p1");
    let time = i64::MAX;
    queue.enqueue(Mutation::log_run(42.2, time, 5.1, true)).unwrap();

    let action = queue.dequeue().unwrap().unwrap();
    assert_eq!(action.mutation, Mutation::log_run(42.2, time, 5.1, true));
  }

  #[test]
  fn test_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.db");

    let first = {
      let storage = OfflineStorage::new(Arc::new(SqliteStorage::open(&path).unwrap()));
      OfflineQueue::new(storage, "p1")
        .enqueue(Mutation::update_user_settings(2500.0, 300.0))
        .unwrap()
    };

    let storage = OfflineStorage::new(Arc::new(SqliteStorage::open(&path).unwrap()));
    let reopened = OfflineQueue::new(storage, "p1");
    assert_eq!(reopened.peek(), Some(first));
  }

  #[test]
  fn test_non_finite_mutation_is_refused() {
    let queue = queue("p1");
    let intake = queue.enqueue(Mutation::add_daily_intake(250.0)).unwrap();
    let sleep = queue.enqueue(Mutation::add_sleep_log(7.5)).unwrap();

    assert!(matches!(
      queue.enqueue(Mutation::add_daily_intake(f64::NAN)),
      Err(StorageError::NonFinite { field: "amount" })
    ));
    assert!(matches!(
      queue.enqueue(Mutation::log_run(5.0, 1, f64::INFINITY, true)),
      Err(StorageError::NonFinite { field: "pace" })
    ));

    let later = queue.enqueue(Mutation::add_daily_intake(100.0)).unwrap();
    assert_eq!(queue.actions(), vec![intake, sleep, later]);
  }

  #[test]
  fn test_unreadable_queue_is_never_overwritten() {
    let storage = OfflineStorage::new(Arc::new(SqliteStorage::open_in_memory().unwrap()));
    let queue = OfflineQueue::new(storage.clone(), "p1");
    queue.enqueue(Mutation::add_daily_intake(250.0)).unwrap();
    queue.enqueue(Mutation::add_sleep_log(7.5)).unwrap();

    // An entry of a kind this build does not know
    let key = storage_key("p1", QUEUE_KEY, DEFAULT_VERSION);
    let blob = storage.raw().get(&key).unwrap().unwrap();
    let corrupted = blob.replace("addSleepLog", "addMeditation");
    storage.raw().set(&key, &corrupted).unwrap();

    assert!(matches!(
      queue.enqueue(Mutation::add_daily_intake(100.0)),
      Err(StorageError::Serde(_))
    ));
    assert!(queue.remove_by_id("anything").is_err());
    assert!(queue.dequeue().is_err());
    assert_eq!(storage.raw().get(&key).unwrap(), Some(corrupted.clone()));

    // Restoring the entry brings both actions back
    storage.raw().set(&key, &blob).unwrap();
    assert_eq!(queue.size(), 2);
  }

  #[test]
  fn test_storage_failures() {
    let queue = OfflineQueue::new(OfflineStorage::new(Arc::new(FailingStore)), "p1");

    assert!(matches!(
      queue.enqueue(Mutation::add_daily_intake(1.0)),
      Err(StorageError::LockPoisoned)
    ));
    assert!(queue.remove_by_id("x").is_err());
    assert_eq!(queue.size(), 0);
    assert!(queue.peek().is_none());
    queue.clear();
  }
}
