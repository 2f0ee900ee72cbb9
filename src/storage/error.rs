use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the durable storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to encode or decode stored value: {0}")]
  Serde(#[from] serde_json::Error),

  #[error("storage lock poisoned")]
  LockPoisoned,

  #[error("failed to create storage directory {}: {source}", path.display())]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("could not determine a data directory for the offline store")]
  NoDataDir,

  #[error("{field} must be a finite number")]
  NonFinite { field: &'static str },

  #[error("update closure was not applied")]
  NotApplied,
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
