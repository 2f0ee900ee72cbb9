//! Durable key-value persistence for offline data.
//!
//! This module does not know what is stored:
//! - `KeyValueStore` is the raw string-to-string backend (SQLite on disk)
//! - `OfflineStorage` layers principal namespacing, schema versions and
//!   timestamped JSON envelopes on top of it
//!
//! Failures are reported as `StorageError` internally. The public read and
//! write helpers on `OfflineStorage` log and swallow them so a broken disk
//! degrades to "no cached data" instead of an error at the call site.

mod error;
mod offline;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use offline::{storage_key, CacheEntry, OfflineStorage, DEFAULT_VERSION};
pub use sqlite::{KeyValueStore, SqliteStorage};
