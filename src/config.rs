use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::FailurePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  /// Principal to act as. Without one, nothing is cached or queued.
  pub principal: Option<String>,
  /// Offline database location (defaults to the platform data directory)
  pub database: Option<PathBuf>,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  pub url: String,
  #[serde(default = "default_request_timeout")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Upper bound for each replayed call during a drain
  #[serde(default = "default_call_timeout")]
  pub call_timeout_secs: u64,
  /// Drop a queued action after this many consecutive failed replays.
  /// Unset keeps retrying it forever.
  pub discard_after: Option<u32>,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      call_timeout_secs: default_call_timeout(),
      discard_after: None,
    }
  }
}

impl SyncConfig {
  pub fn call_timeout(&self) -> Duration {
    Duration::from_secs(self.call_timeout_secs)
  }

  pub fn failure_policy(&self) -> FailurePolicy {
    match self.discard_after {
      Some(limit) if limit > 0 => FailurePolicy::DiscardAfter(limit),
      _ => FailurePolicy::HaltAndRetry,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
  #[serde(default = "default_probe_interval")]
  pub probe_interval_secs: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: default_probe_interval(),
    }
  }
}

fn default_request_timeout() -> u64 {
  20
}

fn default_call_timeout() -> u64 {
  30
}

fn default_probe_interval() -> u64 {
  15
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./habit-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/habit-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/habit-sync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("habit-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("habit-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the backend API token from the environment, if one is set.
  pub fn get_api_token() -> Option<String> {
    std::env::var("HABIT_SYNC_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}
