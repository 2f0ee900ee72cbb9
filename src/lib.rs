//! Offline action queue and cache reconciliation for a habit-tracking
//! backend.
//!
//! Reads go through [`CachedBackend`], which writes successful results
//! through to a per-principal SQLite cache and serves them back while the
//! device is offline. Mutations go through [`MutationInterceptor`], which
//! queues them while offline; [`SyncCoordinator`] replays the queue in order
//! once connectivity returns.

pub mod backend;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod offline;
pub mod session;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod testing;

pub use backend::{Backend, BackendError, HttpBackend};
pub use cache::{CacheKey, CacheResult, CacheSource, CachedBackend};
pub use config::Config;
pub use connectivity::ConnectivityObserver;
pub use context::SyncContext;
pub use offline::{Mutation, OfflineAction, OfflineQueue};
pub use session::Session;
pub use storage::{OfflineStorage, SqliteStorage};
pub use sync::{MutationInterceptor, MutationOutcome, SyncCoordinator, SyncNotice};
