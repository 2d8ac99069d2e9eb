//! Response caching subsystem.
//!
//! - [`CacheKey`]: canonical (network, method, params) key.
//! - [`ResponseCache`]: in-memory LRU + per-entry TTL store (moka), the
//!   default backend.
//! - [`CacheBackend`]: the seam the [`Dispatcher`](crate::Dispatcher) talks
//!   to. A shared backend (e.g. redis for several relay processes) plugs in
//!   here without touching the dispatch path.

pub mod key;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::Result;

pub use key::CacheKey;
pub use store::{CacheConfig, CostFn, ResponseCache};

/// Aggregate cache counters.
///
/// Readable at any time; reading never waits on in-flight calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Summed cost of live entries.
    pub current_size: u64,
    /// Number of live entries.
    pub entries: u64,
    pub capacity: u64,
}

/// Storage used by the dispatcher for cached responses.
pub trait CacheBackend: Send + Sync {
    /// Look up a fresh value.
    ///
    /// `Ok(None)` is a miss (absent or stale). `Err` means the store detected
    /// an internal inconsistency; the caller must treat the call as a miss
    /// and must not populate the cache for it. The in-memory
    /// [`ResponseCache`] never returns `Err`.
    fn lookup(&self, key: &CacheKey) -> Result<Option<Arc<Value>>>;

    /// Insert or overwrite an entry. Evicts least-recently-used entries as
    /// needed to stay within capacity.
    fn put(&self, key: CacheKey, value: Arc<Value>, ttl: Duration);

    /// Remove one entry.
    fn invalidate(&self, key: &CacheKey);

    /// Remove every entry.
    fn clear(&self);

    /// Current counters.
    fn stats(&self) -> CacheStats;
}
