//! The remote habit-tracking service, as seen by the sync layer.

mod http;
mod types;

pub use http::HttpBackend;
pub(crate) use types::int_string;
pub use types::{HydrationLog, RewardType, RunningLog, SleepLog, UserRewards, UserSettings};

use async_trait::async_trait;
use thiserror::Error;

/// Any failure of a remote call. All of them are treated as retryable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
  #[error("network error: {0}")]
  Transport(String),

  #[error("request timed out")]
  Timeout,

  #[error("backend rejected the call ({status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("unexpected response: {0}")]
  Decode(String),
}

impl BackendError {
  /// Short, user-facing description of the failure.
  pub fn user_message(&self) -> String {
    match self {
      Self::Transport(_) => {
        "Network error. Please check your connection and try again.".to_string()
      }
      Self::Timeout => "Request timed out. Please try again.".to_string(),
      Self::Rejected { status, message } => {
        let lower = message.to_lowercase();
        if *status == 401 || *status == 403 || lower.contains("unauthorized") {
          "You need to be logged in to perform this action. Please log in and try again."
            .to_string()
        } else if !message.trim().is_empty() && message.len() < 100 && !message.contains("Error:")
        {
          message.trim().to_string()
        } else {
          "The action could not be completed. Please try again.".to_string()
        }
      }
      Self::Decode(_) => "Something went wrong. Please try again.".to_string(),
    }
  }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Operations of the remote service used by the sync layer.
#[async_trait]
pub trait Backend: Send + Sync {
  async fn add_daily_intake(&self, amount: f64) -> BackendResult<()>;

  async fn add_sleep_log(&self, hours: f64) -> BackendResult<()>;

  async fn log_run(
    &self,
    distance_km: f64,
    duration_nanos: i64,
    pace_min_per_km: f64,
    completed: bool,
  ) -> BackendResult<()>;

  async fn update_user_settings(&self, daily_goal_ml: f64, cup_size_ml: f64) -> BackendResult<()>;

  async fn get_todays_intake(&self) -> BackendResult<f64>;

  async fn get_intake_history(&self) -> BackendResult<Vec<HydrationLog>>;

  async fn get_user_rewards(&self) -> BackendResult<UserRewards>;

  async fn get_todays_sleep(&self) -> BackendResult<f64>;

  async fn get_sleep_history(&self) -> BackendResult<Vec<SleepLog>>;

  async fn get_running_history(&self) -> BackendResult<Vec<RunningLog>>;

  async fn get_todays_runs(&self) -> BackendResult<Vec<RunningLog>>;

  async fn get_user_settings(&self) -> BackendResult<Option<UserSettings>>;

  /// Cheap reachability check used by the connectivity probe.
  async fn ping(&self) -> BackendResult<()>;
}
