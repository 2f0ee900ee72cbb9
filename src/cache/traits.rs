//! Core types for cached reads.

use chrono::{DateTime, Duration, Utc};

/// Result from a cached read, including data and metadata about the source.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>, invalidated: bool) -> Self {
    Self {
      data,
      source: if invalidated {
        CacheSource::OfflineInvalidated
      } else {
        CacheSource::Offline
      },
      cached_at: Some(cached_at),
    }
  }

  pub fn is_offline(&self) -> bool {
    self.source != CacheSource::Network
  }

  /// Human-readable age of cached data, e.g. "5 mins ago".
  pub fn age_label(&self) -> Option<String> {
    self.age_label_at(Utc::now())
  }

  pub fn age_label_at(&self, now: DateTime<Utc>) -> Option<String> {
    let cached_at = self.cached_at?;
    let age = now - cached_at;

    let label = if age < Duration::minutes(1) {
      "just now".to_string()
    } else if age < Duration::hours(1) {
      plural(age.num_minutes(), "min")
    } else if age < Duration::days(1) {
      plural(age.num_hours(), "hour")
    } else {
      cached_at.format("%b %-d").to_string()
    };

    Some(label)
  }
}

fn plural(n: i64, unit: &str) -> String {
  format!("{} {}{} ago", n, unit, if n > 1 { "s" } else { "" })
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Offline mode - network unavailable, serving cached data
  Offline,
  /// Offline mode, and a change made since capture means the data is known stale
  OfflineInvalidated,
}
