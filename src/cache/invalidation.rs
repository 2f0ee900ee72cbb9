//! Tracking of read views made stale by mutations.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

use super::key::CacheKey;

/// A read view that should be refetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
  pub principal: String,
  pub key: CacheKey,
}

/// Remembers invalidated views until their next network read and
/// broadcasts each invalidation to subscribers.
#[derive(Clone)]
pub struct Invalidator {
  stale: Arc<Mutex<HashSet<(String, CacheKey)>>>,
  tx: broadcast::Sender<Invalidation>,
}

impl Invalidator {
  pub fn new() -> Self {
    let (tx, _rx) = broadcast::channel(64);
    Self {
      stale: Arc::new(Mutex::new(HashSet::new())),
      tx,
    }
  }

  /// Mark every key in `keys` stale for `principal`.
  pub fn invalidate<I>(&self, principal: &str, keys: I)
  where
    I: IntoIterator<Item = CacheKey>,
  {
    let mut stale = self.stale();
    for key in keys {
      stale.insert((principal.to_string(), key));
      debug!(principal, key = %key, "Invalidated cached view");
      // No subscribers is fine
      let _ = self.tx.send(Invalidation {
        principal: principal.to_string(),
        key,
      });
    }
  }

  pub fn is_invalidated(&self, principal: &str, key: CacheKey) -> bool {
    self.stale().contains(&(principal.to_string(), key))
  }

  /// Forget the invalidation after fresh data has been fetched.
  pub fn clear(&self, principal: &str, key: CacheKey) {
    self.stale().remove(&(principal.to_string(), key));
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
    self.tx.subscribe()
  }

  fn stale(&self) -> MutexGuard<'_, HashSet<(String, CacheKey)>> {
    // The set stays consistent even if a holder panicked
    self.stale.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Default for Invalidator {
  fn default() -> Self {
    Self::new()
  }
}
