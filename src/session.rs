//! The signed-in principal.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Holds the current principal, if any, and notifies on sign-in/out.
#[derive(Clone)]
pub struct Session {
  tx: Arc<watch::Sender<Option<String>>>,
}

impl Session {
  pub fn new(principal: Option<String>) -> Self {
    let (tx, _rx) = watch::channel(principal.filter(|p| !p.is_empty()));
    Self { tx: Arc::new(tx) }
  }

  pub fn principal(&self) -> Option<String> {
    self.tx.borrow().clone()
  }

  pub fn sign_in(&self, principal: impl Into<String>) {
    let principal = principal.into();
    if principal.is_empty() {
      return;
    }
    info!(principal = %principal, "Signed in");
    self.tx.send_replace(Some(principal));
  }

  /// Forget the principal. Offline data stays on the device.
  pub fn sign_out(&self) {
    if self.tx.send_replace(None).is_some() {
      info!("Signed out");
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
    self.tx.subscribe()
  }
}
