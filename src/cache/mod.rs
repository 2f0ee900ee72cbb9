//! Read-through caching of backend queries for offline use.
//!
//! This module provides:
//! - Write-through of every successful online read, per principal
//! - Serving the last known good result while offline
//! - Invalidation tracking so views changed by a mutation are refetched

mod invalidation;
mod key;
mod layer;
mod traits;

pub use invalidation::{Invalidation, Invalidator};
pub use key::CacheKey;
pub use layer::CachedBackend;
pub use traits::{CacheResult, CacheSource};
