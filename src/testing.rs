//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::{
  Backend, BackendError, BackendResult, HydrationLog, RunningLog, SleepLog, UserRewards,
  UserSettings,
};
use crate::connectivity::ConnectivityObserver;
use crate::context::SyncContext;
use crate::session::Session;
use crate::storage::{KeyValueStore, SqliteStorage, StorageError, StorageResult};

/// A recorded call to the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
  AddDailyIntake(f64),
  AddSleepLog(f64),
  LogRun {
    distance: f64,
    time: i64,
    pace: f64,
    completed: bool,
  },
  UpdateUserSettings {
    daily_goal: f64,
    cup_size: f64,
  },
  Read(&'static str),
}

type FailRule = Box<dyn Fn(&Call) -> bool + Send + Sync>;

/// Scripted in-memory backend that records every call it receives.
pub struct MockBackend {
  calls: Mutex<Vec<Call>>,
  mutation_attempts: Mutex<usize>,
  fail_nth: Mutex<HashSet<usize>>,
  fail_rules: Mutex<Vec<FailRule>>,
  fail_reads: AtomicBool,
  reachable: AtomicBool,
  delay: Mutex<Option<Duration>>,
  todays_intake: Mutex<f64>,
}

impl MockBackend {
  pub fn new() -> Self {
    Self {
      calls: Mutex::new(Vec::new()),
      mutation_attempts: Mutex::new(0),
      fail_nth: Mutex::new(HashSet::new()),
      fail_rules: Mutex::new(Vec::new()),
      fail_reads: AtomicBool::new(false),
      reachable: AtomicBool::new(true),
      delay: Mutex::new(None),
      todays_intake: Mutex::new(0.0),
    }
  }

  /// Every call received so far, successful or not.
  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn mutation_calls(&self) -> Vec<Call> {
    self
      .calls()
      .into_iter()
      .filter(|c| !matches!(c, Call::Read(_)))
      .collect()
  }

  /// Fail the `n`th mutation attempt (1-based, counted across the test).
  pub fn fail_nth_mutation(&self, n: usize) {
    self.fail_nth.lock().unwrap().insert(n);
  }

  /// Fail every mutation for which `rule` returns true.
  pub fn fail_when(&self, rule: impl Fn(&Call) -> bool + Send + Sync + 'static) {
    self.fail_rules.lock().unwrap().push(Box::new(rule));
  }

  pub fn fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  pub fn set_reachable(&self, reachable: bool) {
    self.reachable.store(reachable, Ordering::SeqCst);
  }

  /// Make every mutation take `delay` before answering.
  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = Some(delay);
  }

  pub fn set_todays_intake(&self, amount: f64) {
    *self.todays_intake.lock().unwrap() = amount;
  }

  async fn mutate(&self, call: Call) -> BackendResult<()> {
    let attempt = {
      let mut attempts = self.mutation_attempts.lock().unwrap();
      *attempts += 1;
      *attempts
    };
    self.calls.lock().unwrap().push(call.clone());

    let delay = *self.delay.lock().unwrap();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let failing = self.fail_nth.lock().unwrap().contains(&attempt)
      || self.fail_rules.lock().unwrap().iter().any(|rule| rule(&call));
    if failing {
      return Err(BackendError::Transport("simulated network error".to_string()));
    }

    if let Call::AddDailyIntake(amount) = call {
      *self.todays_intake.lock().unwrap() += amount;
    }
    Ok(())
  }

  fn read<T>(&self, name: &'static str, value: T) -> BackendResult<T> {
    self.calls.lock().unwrap().push(Call::Read(name));
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(BackendError::Transport("simulated network error".to_string()));
    }
    Ok(value)
  }
}

#[async_trait]
impl Backend for MockBackend {
  async fn add_daily_intake(&self, amount: f64) -> BackendResult<()> {
    self.mutate(Call::AddDailyIntake(amount)).await
  }

  async fn add_sleep_log(&self, hours: f64) -> BackendResult<()> {
    self.mutate(Call::AddSleepLog(hours)).await
  }

  async fn log_run(
    &self,
    distance_km: f64,
    duration_nanos: i64,
    pace_min_per_km: f64,
    completed: bool,
  ) -> BackendResult<()> {
    self
      .mutate(Call::LogRun {
        distance: distance_km,
        time: duration_nanos,
        pace: pace_min_per_km,
        completed,
      })
      .await
  }

  async fn update_user_settings(&self, daily_goal_ml: f64, cup_size_ml: f64) -> BackendResult<()> {
    self
      .mutate(Call::UpdateUserSettings {
        daily_goal: daily_goal_ml,
        cup_size: cup_size_ml,
      })
      .await
  }

  async fn get_todays_intake(&self) -> BackendResult<f64> {
    let amount = *self.todays_intake.lock().unwrap();
    self.read("getTodaysIntake", amount)
  }

  async fn get_intake_history(&self) -> BackendResult<Vec<HydrationLog>> {
    self.read(
      "getIntakeHistory",
      vec![HydrationLog {
        date: 19_800,
        total_intake: 1750.0,
      }],
    )
  }

  async fn get_user_rewards(&self) -> BackendResult<UserRewards> {
    self.read(
      "getUserRewards",
      UserRewards {
        last_goal_complete_day: 19_800,
        streak: 4,
        badges: Vec::new(),
        last_updated: 0,
        completed_goals: 9,
      },
    )
  }

  async fn get_todays_sleep(&self) -> BackendResult<f64> {
    self.read("getTodaysSleep", 7.0)
  }

  async fn get_sleep_history(&self) -> BackendResult<Vec<SleepLog>> {
    self.read(
      "getSleepHistory",
      vec![SleepLog {
        hours: 7.0,
        date: 19_800,
      }],
    )
  }

  async fn get_running_history(&self) -> BackendResult<Vec<RunningLog>> {
    self.read("getRunningHistory", Vec::new())
  }

  async fn get_todays_runs(&self) -> BackendResult<Vec<RunningLog>> {
    self.read("getTodaysRuns", Vec::new())
  }

  async fn get_user_settings(&self) -> BackendResult<Option<UserSettings>> {
    self.read(
      "getUserSettings",
      Some(UserSettings {
        daily_goal: 2000.0,
        cup_size: 250.0,
      }),
    )
  }

  async fn ping(&self) -> BackendResult<()> {
    if self.reachable.load(Ordering::SeqCst) {
      Ok(())
    } else {
      Err(BackendError::Transport("unreachable".to_string()))
    }
  }
}

/// A store whose every operation fails.
pub struct FailingStore;

impl KeyValueStore for FailingStore {
  fn get(&self, _key: &str) -> StorageResult<Option<String>> {
    Err(StorageError::LockPoisoned)
  }

  fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
    Err(StorageError::LockPoisoned)
  }

  fn remove(&self, _key: &str) -> StorageResult<()> {
    Err(StorageError::LockPoisoned)
  }

  fn remove_matching(&self, _prefix: &str, _fragment: &str) -> StorageResult<usize> {
    Err(StorageError::LockPoisoned)
  }

  fn update(
    &self,
    _key: &str,
    _apply: &mut dyn FnMut(Option<String>) -> StorageResult<Option<String>>,
  ) -> StorageResult<()> {
    Err(StorageError::LockPoisoned)
  }
}

/// Context over an in-memory store and `backend`.
pub fn context(backend: Arc<MockBackend>, online: bool, principal: Option<&str>) -> SyncContext {
  let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
  SyncContext::new(
    backend,
    store,
    ConnectivityObserver::new(online),
    Session::new(principal.map(String::from)),
  )
}
