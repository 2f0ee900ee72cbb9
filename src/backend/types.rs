use serde::{Deserialize, Serialize};

/// One day of hydration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationLog {
  #[serde(with = "int_string")]
  pub date: i64,
  pub total_intake: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepLog {
  pub hours: f64,
  #[serde(with = "int_string")]
  pub date: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningLog {
  /// Kilometres
  pub distance: f64,
  /// Duration in nanoseconds
  #[serde(with = "int_string")]
  pub time: i64,
  /// Minutes per kilometre
  pub pace: f64,
  pub completed: bool,
  #[serde(with = "int_string")]
  pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
  Sleepyhead,
  PlasticPirate,
  Runner,
  Hydrator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRewards {
  #[serde(with = "int_string")]
  pub last_goal_complete_day: i64,
  #[serde(with = "int_string")]
  pub streak: i64,
  pub badges: Vec<RewardType>,
  #[serde(with = "int_string")]
  pub last_updated: i64,
  #[serde(with = "int_string")]
  pub completed_goals: i64,
}

/// Hydration settings, in millilitres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
  pub daily_goal: f64,
  pub cup_size: f64,
}

/// Serde helpers for 64-bit integers that must not pass through `f64`.
///
/// Values are written as decimal strings. Plain JSON numbers are still
/// accepted on read so older blobs stay readable.
pub(crate) mod int_string {
  use serde::{de, Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
      Text(String),
      Int(i64),
    }

    match Repr::deserialize(deserializer)? {
      Repr::Text(text) => text.trim().parse().map_err(de::Error::custom),
      Repr::Int(value) => Ok(value),
    }
  }
}
