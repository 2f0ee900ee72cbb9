//! Cache layer that routes reads to the network or the offline store.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use tracing::debug;

use super::key::CacheKey;
use super::traits::CacheResult;
use crate::backend::{
  BackendResult, HydrationLog, RunningLog, SleepLog, UserRewards, UserSettings,
};
use crate::context::SyncContext;

/// Backend reads with transparent offline caching.
///
/// Online reads always go to the network and, when the offline preference
/// is enabled, are written through to the principal's cache. Offline reads
/// (with the preference enabled) are served from that cache only.
#[derive(Clone)]
pub struct CachedBackend {
  ctx: SyncContext,
}

impl CachedBackend {
  pub fn new(ctx: SyncContext) -> Self {
    Self { ctx }
  }

  /// Fetch a view through the cache.
  ///
  /// Returns `Ok(None)` when offline and nothing has been cached yet for
  /// this view, so callers can render an empty state instead of an error.
  pub async fn fetch<T, F, Fut>(
    &self,
    key: CacheKey,
    fetcher: F,
  ) -> BackendResult<Option<CacheResult<T>>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = BackendResult<T>>,
  {
    let principal = self.ctx.session.principal();
    let caching = self.ctx.preference.is_enabled();

    if caching && !self.ctx.connectivity.is_online() {
      let Some(principal) = principal else {
        return Ok(None);
      };
      let cached = self.ctx.storage.read::<T>(&principal, key.as_str());
      debug!(principal = %principal, key = %key, hit = cached.is_some(), "Offline read");
      return Ok(cached.map(|entry| {
        let captured_at = entry.captured_at();
        let invalidated = self.ctx.invalidator.is_invalidated(&principal, key);
        CacheResult::offline(entry.data, captured_at, invalidated)
      }));
    }

    let data = fetcher().await?;

    if let Some(principal) = principal {
      if caching {
        self.ctx.storage.write(&principal, key.as_str(), &data);
      }
      self.ctx.invalidator.clear(&principal, key);
    }

    Ok(Some(CacheResult::from_network(data)))
  }

  pub async fn todays_intake(&self) -> BackendResult<Option<CacheResult<f64>>> {
    let backend = self.ctx.backend.clone();
    self
      .fetch(CacheKey::TodaysIntake, || async move { backend.get_todays_intake().await })
      .await
  }

  pub async fn intake_history(&self) -> BackendResult<Option<CacheResult<Vec<HydrationLog>>>> {
    let backend = self.ctx.backend.clone();
    self
      .fetch(CacheKey::IntakeHistory, || async move { backend.get_intake_history().await })
      .await
  }

  pub async fn user_rewards(&self) -> BackendResult<Option<CacheResult<UserRewards>>> {
    let backend = self.ctx.backend.clone();
    self
      .fetch(CacheKey::UserRewards, || async move { backend.get_user_rewards().await })
      .await
  }

  pub async fn todays_sleep(&self) -> BackendResult<Option<CacheResult<f64>>> {
    let backend = self.ctx.backend.clone();
    self
      .fetch(CacheKey::TodaysSleep, || async move { backend.get_todays_sleep().await })
      .await
  }

  pub async fn sleep_history(&self) -> BackendResult<Option<CacheResult<Vec<SleepLog>>>> {
    let backend = self.ctx.backend.clone();
    self
      .fetch(CacheKey::SleepHistory, || async move { backend.get_sleep_history().await })
      .await
  }

  pub async fn running_history(&self) -> BackendResult<Option<CacheResult<Vec<RunningLog>>>> {
    let backend = self.ctx.backend.clone();
    self
      .fetch(CacheKey::RunningHistory, || async move { backend.get_running_history().await })
      .await
  }

  pub async fn todays_runs(&self) -> BackendResult<Option<CacheResult<Vec<RunningLog>>>> {
    let backend = self.ctx.backend.clone();
    self
      .fetch(CacheKey::TodaysRuns, || async move { backend.get_todays_runs().await })
      .await
  }

  /// `data` is `None` when the principal has never saved settings.
  pub async fn user_settings(&self) -> BackendResult<Option<CacheResult<Option<UserSettings>>>> {
    let backend = self.ctx.backend.clone();
    self
      .fetch(CacheKey::UserSettings, || async move { backend.get_user_settings().await })
      .await
  }

  /// Fetch any view as JSON, for callers that only display it.
  pub async fn fetch_json(
    &self,
    key: CacheKey,
  ) -> BackendResult<Option<CacheResult<serde_json::Value>>> {
    fn to_json<T: Serialize>(
      result: Option<CacheResult<T>>,
    ) -> Option<CacheResult<serde_json::Value>> {
      result.map(|r| CacheResult {
        data: serde_json::to_value(&r.data).unwrap_or(serde_json::Value::Null),
        source: r.source,
        cached_at: r.cached_at,
      })
    }

    Ok(match key {
      CacheKey::TodaysIntake => to_json(self.todays_intake().await?),
      CacheKey::IntakeHistory => to_json(self.intake_history().await?),
      CacheKey::UserRewards => to_json(self.user_rewards().await?),
      CacheKey::TodaysSleep => to_json(self.todays_sleep().await?),
      CacheKey::SleepHistory => to_json(self.sleep_history().await?),
      CacheKey::RunningHistory => to_json(self.running_history().await?),
      CacheKey::TodaysRuns => to_json(self.todays_runs().await?),
      CacheKey::UserSettings => to_json(self.user_settings().await?),
    })
  }
}
