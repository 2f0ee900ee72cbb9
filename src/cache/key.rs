use std::fmt;
use std::str::FromStr;

/// Logical keys of the cached read views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
  TodaysIntake,
  IntakeHistory,
  UserRewards,
  TodaysSleep,
  SleepHistory,
  RunningHistory,
  TodaysRuns,
  UserSettings,
}

impl CacheKey {
  pub const ALL: [CacheKey; 8] = [
    CacheKey::TodaysIntake,
    CacheKey::IntakeHistory,
    CacheKey::UserRewards,
    CacheKey::TodaysSleep,
    CacheKey::SleepHistory,
    CacheKey::RunningHistory,
    CacheKey::TodaysRuns,
    CacheKey::UserSettings,
  ];

  /// Logical key used in the offline store.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::TodaysIntake => "todaysIntake",
      Self::IntakeHistory => "intakeHistory",
      Self::UserRewards => "userRewards",
      Self::TodaysSleep => "todaysSleep",
      Self::SleepHistory => "sleepHistory",
      Self::RunningHistory => "runningHistory",
      Self::TodaysRuns => "todaysRuns",
      Self::UserSettings => "userSettings",
    }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CacheKey {
  type Err = String;

  /// Accepts the storage name (`todaysIntake`) or a kebab-case alias
  /// (`todays-intake`), case-insensitively.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().replace(['-', '_'], "").to_lowercase();
    Self::ALL
      .into_iter()
      .find(|key| key.as_str().to_lowercase() == wanted)
      .ok_or_else(|| {
        let names: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown view '{}', expected one of: {}", s, names.join(", "))
      })
  }
}
