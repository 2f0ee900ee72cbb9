use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::types::{HydrationLog, RunningLog, SleepLog, UserRewards, UserSettings};
use super::{Backend, BackendError, BackendResult};
use crate::config::{BackendConfig, Config};

/// JSON-over-HTTP client for the habit-tracking service.
///
/// Every operation is `POST <base>/api/<method>` with the arguments as a JSON
/// object and the result as the JSON response body.
#[derive(Clone)]
pub struct HttpBackend {
  client: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl HttpBackend {
  pub fn new(config: &BackendConfig) -> Result<Self> {
    // Url::join drops the last path segment unless the base ends with '/'
    let mut raw = config.url.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }
    let base =
      Url::parse(&raw).map_err(|e| eyre!("Invalid backend URL {}: {}", config.url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token: Config::get_api_token(),
    })
  }

  fn endpoint(&self, method: &str) -> BackendResult<Url> {
    self
      .base
      .join(&format!("api/{}", method))
      .map_err(|e| BackendError::Transport(format!("invalid endpoint {}: {}", method, e)))
  }

  async fn post<A: Serialize + ?Sized>(
    &self,
    method: &str,
    args: &A,
  ) -> BackendResult<reqwest::Response> {
    let mut request = self.client.post(self.endpoint(method)?).json(args);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
      let message = response.text().await.unwrap_or_default();
      return Err(BackendError::Rejected {
        status: status.as_u16(),
        message,
      });
    }

    Ok(response)
  }

  async fn call<A: Serialize + ?Sized, R: DeserializeOwned>(
    &self,
    method: &str,
    args: &A,
  ) -> BackendResult<R> {
    self
      .post(method, args)
      .await?
      .json::<R>()
      .await
      .map_err(|e| BackendError::Decode(format!("{}: {}", method, e)))
  }

  async fn call_unit<A: Serialize + ?Sized>(&self, method: &str, args: &A) -> BackendResult<()> {
    self.post(method, args).await.map(|_| ())
  }
}

fn transport_error(e: reqwest::Error) -> BackendError {
  if e.is_timeout() {
    BackendError::Timeout
  } else {
    BackendError::Transport(e.to_string())
  }
}

#[async_trait]
impl Backend for HttpBackend {
  async fn add_daily_intake(&self, amount: f64) -> BackendResult<()> {
    self.call_unit("addDailyIntake", &json!({ "amount": amount })).await
  }

  async fn add_sleep_log(&self, hours: f64) -> BackendResult<()> {
    self.call_unit("addSleepLog", &json!({ "hours": hours })).await
  }

  async fn log_run(
    &self,
    distance_km: f64,
    duration_nanos: i64,
    pace_min_per_km: f64,
    completed: bool,
  ) -> BackendResult<()> {
    let args = json!({
      "distance": distance_km,
      "time": duration_nanos.to_string(),
      "pace": pace_min_per_km,
      "completed": completed,
    });
    self.call_unit("logRun", &args).await
  }

  async fn update_user_settings(&self, daily_goal_ml: f64, cup_size_ml: f64) -> BackendResult<()> {
    let args = json!({ "dailyGoal": daily_goal_ml, "cupSize": cup_size_ml });
    self.call_unit("updateUserSettings", &args).await
  }

  async fn get_todays_intake(&self) -> BackendResult<f64> {
    self.call("getTodaysIntake", &json!({})).await
  }

  async fn get_intake_history(&self) -> BackendResult<Vec<HydrationLog>> {
    self.call("getIntakeHistory", &json!({})).await
  }

  async fn get_user_rewards(&self) -> BackendResult<UserRewards> {
    self.call("getUserRewards", &json!({})).await
  }

  async fn get_todays_sleep(&self) -> BackendResult<f64> {
    self.call("getTodaysSleep", &json!({})).await
  }

  async fn get_sleep_history(&self) -> BackendResult<Vec<SleepLog>> {
    self.call("getSleepHistory", &json!({})).await
  }

  async fn get_running_history(&self) -> BackendResult<Vec<RunningLog>> {
    self.call("getRunningHistory", &json!({})).await
  }

  async fn get_todays_runs(&self) -> BackendResult<Vec<RunningLog>> {
    self.call("getTodaysRuns", &json!({})).await
  }

  async fn get_user_settings(&self) -> BackendResult<Option<UserSettings>> {
    self.call("getUserSettings", &json!({})).await
  }

  async fn ping(&self) -> BackendResult<()> {
    self.call_unit("ping", &json!({})).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_endpoint_keeps_base_path() {
    let backend = HttpBackend::new(&BackendConfig {
      url: "https://habits.example.com/v2".to_string(),
      timeout_secs: 5,
    })
    .unwrap();

    assert_eq!(
      backend.endpoint("logRun").unwrap().as_str(),
      "https://habits.example.com/v2/api/logRun"
    );
  }

  #[test]
  fn test_rejects_invalid_url() {
    let result = HttpBackend::new(&BackendConfig {
      url: "not a url".to_string(),
      timeout_secs: 5,
    });
    assert!(result.is_err());
  }
}
