use thiserror::Error;
use tracing::debug;

use super::dispatch;
use crate::backend::BackendError;
use crate::context::SyncContext;
use crate::offline::Mutation;
use crate::storage::StorageError;

/// What happened to a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
  /// Recorded for replay; nothing has reached the backend yet.
  Queued,
  /// Applied by the backend.
  Applied(T),
}

impl<T> MutationOutcome<T> {
  pub fn is_queued(&self) -> bool {
    matches!(self, Self::Queued)
  }
}

#[derive(Debug, Error)]
pub enum MutationError {
  #[error(transparent)]
  Backend(#[from] BackendError),

  #[error("could not save the change for later sync: {0}")]
  Queue(#[from] StorageError),
}

/// Front door for every mutation the application issues.
///
/// Callers validate their inputs; this type only routes them.
#[derive(Clone)]
pub struct MutationInterceptor {
  ctx: SyncContext,
}

impl MutationInterceptor {
  pub fn new(ctx: SyncContext) -> Self {
    Self { ctx }
  }

  pub async fn add_daily_intake(&self, amount: f64) -> Result<MutationOutcome<()>, MutationError> {
    self.submit(Mutation::add_daily_intake(amount)).await
  }

  pub async fn add_sleep_log(&self, hours: f64) -> Result<MutationOutcome<()>, MutationError> {
    self.submit(Mutation::add_sleep_log(hours)).await
  }

  pub async fn log_run(
    &self,
    distance_km: f64,
    duration_nanos: i64,
    pace_min_per_km: f64,
    completed: bool,
  ) -> Result<MutationOutcome<()>, MutationError> {
    self
      .submit(Mutation::log_run(
        distance_km,
        duration_nanos,
        pace_min_per_km,
        completed,
      ))
      .await
  }

  pub async fn update_user_settings(
    &self,
    daily_goal_ml: f64,
    cup_size_ml: f64,
  ) -> Result<MutationOutcome<()>, MutationError> {
    self
      .submit(Mutation::update_user_settings(daily_goal_ml, cup_size_ml))
      .await
  }

  /// Queue `mutation` if offline saving applies, otherwise send it now.
  ///
  /// The queued path leaves caches alone: a queued change is accepted for
  /// later, not applied.
  pub async fn submit(&self, mutation: Mutation) -> Result<MutationOutcome<()>, MutationError> {
    let kind = mutation.action_type();

    if let Some(principal) = self.ctx.deferral_principal() {
      let action = self.ctx.queue(&principal).enqueue(mutation)?;
      debug!(principal = %principal, id = %action.id, ?kind, "Deferred mutation");
      return Ok(MutationOutcome::Queued);
    }

    dispatch(self.ctx.backend.as_ref(), &mutation).await?;
    debug!(?kind, "Applied mutation");

    if let Some(principal) = self.ctx.session.principal() {
      self
        .ctx
        .invalidator
        .invalidate(&principal, kind.affected_views().iter().copied());
    }

    Ok(MutationOutcome::Applied(()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheKey;
  use crate::testing::{context, Call, MockBackend};
  use std::sync::Arc;

  #[tokio::test]
  async fn test_offline_mutation_is_queued_without_network() {
    let backend = Arc::new(MockBackend::new());
    let ctx = context(backend.clone(), false, Some("P1"));
    let interceptor = MutationInterceptor::new(ctx.clone());

    let outcome = interceptor.add_daily_intake(250.0).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Queued);
    assert_eq!(ctx.queue("P1").size(), 1);
    assert!(backend.calls().is_empty());
    assert!(!ctx.invalidator.is_invalidated("P1", CacheKey::TodaysIntake));
  }

  #[tokio::test]
  async fn test_online_mutation_applies_and_invalidates() {
    let backend = Arc::new(MockBackend::new());
    let ctx = context(backend.clone(), true, Some("P1"));
    let interceptor = MutationInterceptor::new(ctx.clone());

    let outcome = interceptor.add_sleep_log(8.0).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied(()));
    assert_eq!(backend.calls(), vec![Call::AddSleepLog(8.0)]);
    assert!(ctx.queue("P1").is_empty());
    assert!(ctx.invalidator.is_invalidated("P1", CacheKey::TodaysSleep));
    assert!(ctx.invalidator.is_invalidated("P1", CacheKey::SleepHistory));
    assert!(!ctx.invalidator.is_invalidated("P1", CacheKey::TodaysIntake));
  }

  #[tokio::test]
  async fn test_online_failure_propagates() {
    let backend = Arc::new(MockBackend::new());
    backend.fail_nth_mutation(1);
    let ctx = context(backend.clone(), true, Some("P1"));
    let interceptor = MutationInterceptor::new(ctx.clone());

    let err = interceptor.update_user_settings(2000.0, 250.0).await.unwrap_err();

    assert!(matches!(err, MutationError::Backend(BackendError::Transport(_))));
    assert!(ctx.queue("P1").is_empty());
    assert!(!ctx.invalidator.is_invalidated("P1", CacheKey::UserSettings));
  }

  #[tokio::test]
  async fn test_offline_without_preference_calls_backend() {
    let backend = Arc::new(MockBackend::new());
    let ctx = context(backend.clone(), false, Some("P1"));
    ctx.preference.set_enabled(false);
    let interceptor = MutationInterceptor::new(ctx.clone());

    let outcome = interceptor.log_run(5.0, 1_500_000_000_000, 5.0, true).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied(()));
    assert_eq!(backend.mutation_calls().len(), 1);
    assert!(ctx.queue("P1").is_empty());
  }

  #[tokio::test]
  async fn test_offline_without_identity_calls_backend() {
    let backend = Arc::new(MockBackend::new());
    backend.fail_nth_mutation(1);
    let interceptor = MutationInterceptor::new(context(backend.clone(), false, None));

    assert!(interceptor.add_daily_intake(100.0).await.is_err());
    assert_eq!(backend.calls(), vec![Call::AddDailyIntake(100.0)]);
  }

  #[tokio::test]
  async fn test_non_finite_offline_mutation_keeps_earlier_actions() {
    let backend = Arc::new(MockBackend::new());
    let ctx = context(backend.clone(), false, Some("P1"));
    let interceptor = MutationInterceptor::new(ctx.clone());
    interceptor.add_daily_intake(250.0).await.unwrap();
    interceptor.add_sleep_log(7.5).await.unwrap();

    let err = interceptor.add_daily_intake(f64::NAN).await.unwrap_err();
    assert!(matches!(
      err,
      MutationError::Queue(StorageError::NonFinite { field: "amount" })
    ));

    interceptor.add_daily_intake(100.0).await.unwrap();
    assert_eq!(ctx.queue("P1").size(), 3);
    assert!(backend.calls().is_empty());
  }

  #[tokio::test]
  async fn test_queue_failure_is_reported() {
    use crate::connectivity::ConnectivityObserver;
    use crate::session::Session;
    use crate::testing::FailingStore;

    let backend = Arc::new(MockBackend::new());
    let ctx = SyncContext::new(
      backend.clone(),
      Arc::new(FailingStore),
      ConnectivityObserver::new(false),
      Session::new(Some("P1".to_string())),
    );
    let interceptor = MutationInterceptor::new(ctx);

    let err = interceptor.add_daily_intake(250.0).await.unwrap_err();
    assert!(matches!(err, MutationError::Queue(_)));
    assert!(backend.calls().is_empty());
  }
}
