//! Online/offline tracking.
//!
//! The reported state is only a hint: "online" means the platform (or the
//! probe) believes the backend is reachable, not that the next call will
//! succeed. Subscribers are woken on transitions only.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::Backend;

#[derive(Clone)]
pub struct ConnectivityObserver {
  tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityObserver {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Record the current state. Returns `true` if this was a transition.
  pub fn report(&self, online: bool) -> bool {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    });
    if changed {
      info!(online, "Connectivity changed");
    }
    changed
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }

  /// Periodically ping `backend` and report the outcome.
  ///
  /// Only transitions reach subscribers, so a steady state never triggers
  /// work downstream.
  pub fn spawn_probe(&self, backend: Arc<dyn Backend>, interval: Duration) -> JoinHandle<()> {
    let observer = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let reachable = backend.ping().await.is_ok();
        observer.report(reachable);
      }
    })
  }
}
