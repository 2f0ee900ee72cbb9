//! Routing of mutations and replay of the offline queue.
//!
//! - `MutationInterceptor` decides per call whether to hit the backend now
//!   or record the mutation for later
//! - `SyncCoordinator` drains recorded mutations, strictly in order, when
//!   the device comes back online

mod coordinator;
mod interceptor;

pub use coordinator::{DrainReport, FailurePolicy, SyncCoordinator, SyncNotice, SyncState};
pub use interceptor::{MutationError, MutationInterceptor, MutationOutcome};

use crate::backend::{Backend, BackendResult};
use crate::offline::Mutation;

/// Send `mutation` to the matching backend operation.
pub(crate) async fn dispatch(backend: &dyn Backend, mutation: &Mutation) -> BackendResult<()> {
  match mutation {
    Mutation::AddDailyIntake(p) => backend.add_daily_intake(p.amount).await,
    Mutation::AddSleepLog(p) => backend.add_sleep_log(p.hours).await,
    Mutation::LogRun(p) => backend.log_run(p.distance, p.time, p.pace, p.completed).await,
    Mutation::UpdateUserSettings(p) => backend.update_user_settings(p.daily_goal, p.cup_size).await,
  }
}
