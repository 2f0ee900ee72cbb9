//! Replays the offline queue when connectivity returns.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dispatch;
use crate::backend::{BackendError, BackendResult};
use crate::context::SyncContext;
use crate::offline::{OfflineAction, OfflineQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  Idle,
  Syncing,
}

/// What to do with a queued action the backend keeps refusing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
  /// Stop the drain and retry the same action on the next trigger, forever.
  #[default]
  HaltAndRetry,
  /// Drop the action after this many consecutive failed replays.
  DiscardAfter(u32),
}

/// User-visible progress of a drain.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
  Started { pending: usize },
  Synced { count: usize },
  Failed { action_id: String, message: String },
  Discarded { action_id: String, attempts: u32 },
}

impl fmt::Display for SyncNotice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Started { .. } => write!(f, "Syncing offline changes..."),
      Self::Synced { count } => write!(
        f,
        "Synced {} offline change{}",
        count,
        if *count == 1 { "" } else { "s" }
      ),
      Self::Failed { message, .. } => write!(
        f,
        "Sync failed for some changes: {} Will retry when you're back online. Your data is safe.",
        message
      ),
      Self::Discarded { attempts, .. } => write!(
        f,
        "A saved change was rejected {} times and has been dropped",
        attempts
      ),
    }
  }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub synced: usize,
  pub discarded: usize,
  /// The pass stopped on a failure with actions left behind
  pub halted: bool,
  pub remaining: usize,
}

/// Drains the signed-in principal's queue, one action at a time.
///
/// Only one drain runs at a time; a trigger while syncing is ignored.
pub struct SyncCoordinator {
  ctx: SyncContext,
  syncing: AtomicBool,
  notices: broadcast::Sender<SyncNotice>,
  call_timeout: Duration,
  policy: FailurePolicy,
  /// Consecutive failed replays per action id
  failures: Mutex<HashMap<String, u32>>,
}

impl SyncCoordinator {
  pub fn new(ctx: SyncContext) -> Self {
    let (notices, _rx) = broadcast::channel(32);
    Self {
      ctx,
      syncing: AtomicBool::new(false),
      notices,
      call_timeout: Duration::from_secs(30),
      policy: FailurePolicy::default(),
      failures: Mutex::new(HashMap::new()),
    }
  }

  pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
    self.call_timeout = call_timeout;
    self
  }

  pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn state(&self) -> SyncState {
    if self.syncing.load(Ordering::Acquire) {
      SyncState::Syncing
    } else {
      SyncState::Idle
    }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
    self.notices.subscribe()
  }

  /// Drain the queue if the device is online, offline saving is enabled,
  /// someone is signed in and no drain is already running.
  ///
  /// Returns `None` when no drain was started.
  pub async fn try_sync(&self) -> Option<DrainReport> {
    let principal = self.ctx.drain_principal()?;

    if self
      .syncing
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      debug!("Sync already in progress");
      return None;
    }
    let _guard = SyncingGuard(&self.syncing);

    Some(self.drain(&principal).await)
  }

  /// Watch connectivity, the offline preference and the session, and drain
  /// whenever one of them changes into a state that allows it.
  pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
    tokio::spawn(self.run())
  }

  pub async fn run(self: Arc<Self>) {
    let mut online = self.ctx.connectivity.subscribe();
    let mut preference = self.ctx.preference.subscribe();
    let mut session = self.ctx.session.subscribe();

    self.trigger();

    loop {
      let triggered = tokio::select! {
        changed = online.changed() => {
          if changed.is_err() {
            break;
          }
          let is_online = *online.borrow_and_update();
          is_online
        }
        changed = preference.changed() => {
          if changed.is_err() {
            break;
          }
          let enabled = *preference.borrow_and_update();
          enabled
        }
        changed = session.changed() => {
          if changed.is_err() {
            break;
          }
          let signed_in = session.borrow_and_update().is_some();
          signed_in
        }
      };

      if triggered {
        self.trigger();
      }
    }
  }

  /// Start a drain in the background so further changes are still observed
  /// (and ignored by the guard) while it runs.
  fn trigger(self: &Arc<Self>) {
    let this = Arc::clone(self);
    tokio::spawn(async move {
      this.try_sync().await;
    });
  }

  async fn drain(&self, principal: &str) -> DrainReport {
    let queue = self.ctx.queue(principal);
    let mut report = DrainReport::default();

    let actions = queue.actions();
    self.prune_failures(&actions);

    let pending = actions.len();
    if pending == 0 {
      return report;
    }

    info!(principal, pending, "Syncing offline changes");
    self.notify(SyncNotice::Started { pending });

    let mut touched = BTreeSet::new();

    while let Some(action) = queue.peek() {
      match self.replay(&action).await {
        Ok(()) => {
          self.reset_failures(&action.id);
          report.synced += 1;
          touched.extend(action.action_type().affected_views().iter().copied());

          if let Err(e) = queue.remove_by_id(&action.id) {
            // Replayed but still queued: stop rather than send it twice
            error!(principal, id = %action.id, error = %e, "Failed to remove synced action");
            self.notify(SyncNotice::Failed {
              action_id: action.id.clone(),
              message: "Could not save sync progress on this device.".to_string(),
            });
            report.halted = true;
            break;
          }
        }
        Err(e) => {
          let attempts = self.record_failure(&action.id);
          warn!(
            principal,
            id = %action.id,
            kind = ?action.action_type(),
            attempts,
            error = %e,
            "Failed to sync offline action"
          );

          if self.discard(&queue, &action, attempts) {
            report.discarded += 1;
            continue;
          }

          self.notify(SyncNotice::Failed {
            action_id: action.id.clone(),
            message: e.user_message(),
          });
          report.halted = true;
          break;
        }
      }
    }

    if report.synced > 0 {
      self.ctx.invalidator.invalidate(principal, touched);
      self.notify(SyncNotice::Synced {
        count: report.synced,
      });
    }

    report.remaining = queue.size();
    info!(
      principal,
      synced = report.synced,
      discarded = report.discarded,
      remaining = report.remaining,
      "Sync finished"
    );
    report
  }

  async fn replay(&self, action: &OfflineAction) -> BackendResult<()> {
    let call = dispatch(self.ctx.backend.as_ref(), &action.mutation);
    tokio::time::timeout(self.call_timeout, call)
      .await
      .unwrap_or(Err(BackendError::Timeout))
  }

  /// Apply the failure policy. Returns whether the action was dropped.
  fn discard(&self, queue: &OfflineQueue, action: &OfflineAction, attempts: u32) -> bool {
    let FailurePolicy::DiscardAfter(limit) = self.policy else {
      return false;
    };
    if attempts < limit {
      return false;
    }

    match queue.remove_by_id(&action.id) {
      Ok(_) => {
        warn!(id = %action.id, attempts, "Discarded offline action after repeated failures");
        self.reset_failures(&action.id);
        self.notify(SyncNotice::Discarded {
          action_id: action.id.clone(),
          attempts,
        });
        true
      }
      Err(e) => {
        error!(id = %action.id, error = %e, "Failed to discard offline action");
        false
      }
    }
  }

  fn record_failure(&self, id: &str) -> u32 {
    let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
    let count = failures.entry(id.to_string()).or_insert(0);
    *count += 1;
    *count
  }

  /// Forget counts of actions no longer queued, e.g. after the queue was
  /// cleared. Counts for other principals' queues are dropped as well.
  fn prune_failures(&self, queued: &[OfflineAction]) {
    let live: HashSet<&str> = queued.iter().map(|action| action.id.as_str()).collect();
    self
      .failures
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .retain(|id, _| live.contains(id.as_str()));
  }

  fn reset_failures(&self, id: &str) {
    self
      .failures
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(id);
  }

  fn notify(&self, notice: SyncNotice) {
    // Nobody listening is fine
    let _ = self.notices.send(notice);
  }
}

struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}
