//! Shared handles passed to every component of the sync layer.

use std::sync::Arc;
use tracing::info;

use crate::backend::Backend;
use crate::cache::Invalidator;
use crate::connectivity::ConnectivityObserver;
use crate::offline::{OfflinePreference, OfflineQueue};
use crate::session::Session;
use crate::storage::{KeyValueStore, OfflineStorage};

/// Everything the interceptor, coordinator and cache need, bundled so it
/// can be built once per process and cloned cheaply.
#[derive(Clone)]
pub struct SyncContext {
  pub backend: Arc<dyn Backend>,
  pub storage: OfflineStorage,
  pub connectivity: ConnectivityObserver,
  pub preference: OfflinePreference,
  pub session: Session,
  pub invalidator: Invalidator,
}

impl SyncContext {
  pub fn new(
    backend: Arc<dyn Backend>,
    store: Arc<dyn KeyValueStore>,
    connectivity: ConnectivityObserver,
    session: Session,
  ) -> Self {
    Self {
      backend,
      preference: OfflinePreference::load(store.clone()),
      storage: OfflineStorage::new(store),
      connectivity,
      session,
      invalidator: Invalidator::new(),
    }
  }

  pub fn queue(&self, principal: &str) -> OfflineQueue {
    OfflineQueue::new(self.storage.clone(), principal)
  }

  /// The queue of the signed-in principal, if any.
  pub fn current_queue(&self) -> Option<OfflineQueue> {
    self.session.principal().map(|p| self.queue(&p))
  }

  /// The principal to queue for, when mutations should be deferred.
  ///
  /// Deferral needs all three: no connectivity, the preference enabled,
  /// and someone signed in.
  pub fn deferral_principal(&self) -> Option<String> {
    if self.connectivity.is_online() || !self.preference.is_enabled() {
      return None;
    }
    self.session.principal()
  }

  /// The principal to drain for, when a drain is allowed to start.
  pub fn drain_principal(&self) -> Option<String> {
    if !self.connectivity.is_online() || !self.preference.is_enabled() {
      return None;
    }
    self.session.principal()
  }

  /// Delete all cached views and pending actions of the signed-in principal.
  pub fn forget_device_data(&self) {
    if let Some(principal) = self.session.principal() {
      let pending = self.queue(&principal).size();
      info!(principal = %principal, pending, "Forgetting offline data");
      self.storage.clear_all(&principal);
    }
  }
}
