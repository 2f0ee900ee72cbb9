//! Queued mutation records.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::backend::int_string;
use crate::cache::CacheKey;

/// The closed set of mutations that can be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
  AddDailyIntake,
  AddSleepLog,
  LogRun,
  UpdateUserSettings,
}

impl ActionType {
  /// Read views whose data this mutation changes on the backend.
  ///
  /// Goal completion, streaks and badges derive from every log kind, so all
  /// of them touch `UserRewards`.
  pub fn affected_views(self) -> &'static [CacheKey] {
    match self {
      Self::AddDailyIntake => &[
        CacheKey::TodaysIntake,
        CacheKey::IntakeHistory,
        CacheKey::UserRewards,
      ],
      Self::AddSleepLog => &[
        CacheKey::TodaysSleep,
        CacheKey::SleepHistory,
        CacheKey::UserRewards,
      ],
      Self::LogRun => &[
        CacheKey::RunningHistory,
        CacheKey::TodaysRuns,
        CacheKey::UserRewards,
      ],
      Self::UpdateUserSettings => &[
        CacheKey::UserSettings,
        CacheKey::TodaysIntake,
        CacheKey::UserRewards,
      ],
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakePayload {
  /// Millilitres
  pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepPayload {
  pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPayload {
  /// Kilometres
  pub distance: f64,
  /// Duration in nanoseconds
  #[serde(with = "int_string")]
  pub time: i64,
  /// Minutes per kilometre
  pub pace: f64,
  pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
  pub daily_goal: f64,
  pub cup_size: f64,
}

/// A mutation together with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
  AddDailyIntake(IntakePayload),
  AddSleepLog(SleepPayload),
  LogRun(RunPayload),
  UpdateUserSettings(SettingsPayload),
}

impl Mutation {
  pub fn add_daily_intake(amount: f64) -> Self {
    Self::AddDailyIntake(IntakePayload { amount })
  }

  pub fn add_sleep_log(hours: f64) -> Self {
    Self::AddSleepLog(SleepPayload { hours })
  }

  pub fn log_run(distance: f64, time_nanos: i64, pace: f64, completed: bool) -> Self {
    Self::LogRun(RunPayload {
      distance,
      time: time_nanos,
      pace,
      completed,
    })
  }

  pub fn update_user_settings(daily_goal: f64, cup_size: f64) -> Self {
    Self::UpdateUserSettings(SettingsPayload {
      daily_goal,
      cup_size,
    })
  }

  /// The first numeric argument that is NaN or infinite, if any.
  ///
  /// JSON has no encoding for these, so they cannot be stored.
  pub fn non_finite_field(&self) -> Option<&'static str> {
    let fields = match self {
      Self::AddDailyIntake(p) => vec![("amount", p.amount)],
      Self::AddSleepLog(p) => vec![("hours", p.hours)],
      Self::LogRun(p) => vec![("distance", p.distance), ("pace", p.pace)],
      Self::UpdateUserSettings(p) => vec![("dailyGoal", p.daily_goal), ("cupSize", p.cup_size)],
    };
    fields
      .into_iter()
      .find(|(_, value)| !value.is_finite())
      .map(|(name, _)| name)
  }

  pub fn action_type(&self) -> ActionType {
    match self {
      Self::AddDailyIntake(_) => ActionType::AddDailyIntake,
      Self::AddSleepLog(_) => ActionType::AddSleepLog,
      Self::LogRun(_) => ActionType::LogRun,
      Self::UpdateUserSettings(_) => ActionType::UpdateUserSettings,
    }
  }
}

/// A mutation recorded while offline, waiting to be replayed.
///
/// Stored as `{"id", "type", "payload", "timestamp"}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawAction")]
pub struct OfflineAction {
  pub id: String,
  pub mutation: Mutation,
  /// Creation time in epoch milliseconds
  pub timestamp: i64,
}

impl OfflineAction {
  pub fn action_type(&self) -> ActionType {
    self.mutation.action_type()
  }
}

impl Serialize for OfflineAction {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut state = serializer.serialize_struct("OfflineAction", 4)?;
    state.serialize_field("id", &self.id)?;
    state.serialize_field("type", &self.action_type())?;
    match &self.mutation {
      Mutation::AddDailyIntake(payload) => state.serialize_field("payload", payload)?,
      Mutation::AddSleepLog(payload) => state.serialize_field("payload", payload)?,
      Mutation::LogRun(payload) => state.serialize_field("payload", payload)?,
      Mutation::UpdateUserSettings(payload) => state.serialize_field("payload", payload)?,
    }
    state.serialize_field("timestamp", &self.timestamp)?;
    state.end()
  }
}

#[derive(Deserialize)]
struct RawAction {
  id: String,
  #[serde(rename = "type")]
  kind: ActionType,
  payload: serde_json::Value,
  timestamp: i64,
}

impl TryFrom<RawAction> for OfflineAction {
  type Error = serde_json::Error;

  fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
    let mutation = match raw.kind {
      ActionType::AddDailyIntake => Mutation::AddDailyIntake(serde_json::from_value(raw.payload)?),
      ActionType::AddSleepLog => Mutation::AddSleepLog(serde_json::from_value(raw.payload)?),
      ActionType::LogRun => Mutation::LogRun(serde_json::from_value(raw.payload)?),
      ActionType::UpdateUserSettings => {
        Mutation::UpdateUserSettings(serde_json::from_value(raw.payload)?)
      }
    };

    Ok(Self {
      id: raw.id,
      mutation,
      timestamp: raw.timestamp,
    })
  }
}
