//! In-memory response store with per-entry TTL and LRU eviction.
//!
//! [`ResponseCache`] wraps a `moka::sync::Cache` configured with:
//!
//! - the plain LRU eviction policy (by last access, not insertion),
//! - a weigher that reads each entry's precomputed `size_cost`,
//! - a per-entry expiry equal to the entry's own TTL.
//!
//! moka's concurrent hash table is lock-free for readers; there is no
//! whole-map lock on the get/put path. Maintenance (applying recorded reads
//! and writes, evicting over-capacity entries) is run at the end of every
//! [`put`](ResponseCache::put), so capacity is enforced before `put` returns.
//!
//! # Freshness
//!
//! moka's own expiry runs on the wall clock and only reclaims memory.
//! Whether an entry may be served is decided here against
//! [`tokio::time::Instant`]: an entry is stale once `now > created_at + ttl`.
//! A TTL too large to add to the clock never expires. A stale entry is removed on read (only if it is still the same entry, so
//! a concurrent overwrite is never lost) and reported as a miss. Using
//! tokio's clock lets tests drive TTLs with `tokio::time::advance`.
//!
//! # Cost
//!
//! Capacity is measured in cost units. The default [`CostFn`] charges one
//! unit per entry, making capacity an entry count.
//! [`CacheConfig::byte_weighted()`] charges the serialized JSON length
//! instead.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::Expiry;
use moka::ops::compute::{CompResult, Op};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use super::{CacheBackend, CacheKey, CacheStats};
use crate::Result;

/// Per-entry cost function. Returned costs below 1 are charged as 1.
pub type CostFn = Arc<dyn Fn(&Value) -> u32 + Send + Sync>;

/// Configuration for the response cache.
///
/// ```rust
/// # use chainrelay::CacheConfig;
/// let config = CacheConfig::new().capacity(50_000);
/// assert_eq!(config.capacity, 50_000);
/// ```
#[derive(Clone)]
pub struct CacheConfig {
    /// Maximum summed cost of live entries. Default: 10,000.
    pub capacity: u64,
    /// Cost charged for each entry. Default: 1 per entry.
    pub cost: CostFn,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            cost: Arc::new(|_| 1),
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity in cost units.
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set a custom per-entry cost function.
    pub fn cost_fn(mut self, cost: impl Fn(&Value) -> u32 + Send + Sync + 'static) -> Self {
        self.cost = Arc::new(cost);
        self
    }

    /// Charge each entry its compact serialized JSON length in bytes.
    pub fn byte_weighted(self) -> Self {
        self.cost_fn(|value| {
            serde_json::to_vec(value)
                .map(|bytes| u32::try_from(bytes.len()).unwrap_or(u32::MAX))
                .unwrap_or(u32::MAX)
        })
    }
}

/// One cached response.
#[derive(Debug)]
struct CacheEntry {
    value: Arc<Value>,
    created_at: Instant,
    ttl: Duration,
    size_cost: u32,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.created_at
            .checked_add(self.ttl)
            .is_some_and(|expires_at| now > expires_at)
    }
}

/// Hands each entry's TTL to moka so expired entries are reclaimed.
struct EntryExpiry;

impl Expiry<CacheKey, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &Arc<CacheEntry>,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &Arc<CacheEntry>,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory response cache. See module docs.
pub struct ResponseCache {
    entries: Cache<CacheKey, Arc<CacheEntry>>,
    cost: CostFn,
    capacity: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a new response cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.capacity)
            .weigher(|_key: &CacheKey, entry: &Arc<CacheEntry>| entry.size_cost)
            .expire_after(EntryExpiry)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self {
            entries,
            cost: Arc::clone(&config.cost),
            capacity: config.capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached value iff a fresh entry exists.
    ///
    /// Stale entries are removed and count as misses.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Value>> {
        self.lookup(key).unwrap_or(None)
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove `key` only if it still maps to `stale`.
    fn remove_if_same(&self, key: &CacheKey, stale: &Arc<CacheEntry>) {
        let result = self
            .entries
            .entry_by_ref(key)
            .and_compute_with(|current| match current {
                Some(current) if Arc::ptr_eq(current.value(), stale) => Op::Remove,
                _ => Op::Nop,
            });
        if matches!(result, CompResult::Removed(_)) {
            self.entries.run_pending_tasks();
        }
    }
}

impl CacheBackend for ResponseCache {
    fn lookup(&self, key: &CacheKey) -> Result<Option<Arc<Value>>> {
        let Some(entry) = self.entries.get(key) else {
            self.miss();
            return Ok(None);
        };

        if entry.is_expired(Instant::now()) {
            self.remove_if_same(key, &entry);
            self.miss();
            debug!(key = key.as_str(), "stale cache entry removed on read");
            return Ok(None);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(Arc::clone(&entry.value)))
    }

    fn put(&self, key: CacheKey, value: Arc<Value>, ttl: Duration) {
        let size_cost = (self.cost)(&value).max(1);
        if u64::from(size_cost) > self.capacity {
            debug!(
                key = key.as_str(),
                size_cost,
                capacity = self.capacity,
                "entry larger than cache capacity, not cached"
            );
            return;
        }
        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
            ttl,
            size_cost,
        };
        self.entries.insert(key, Arc::new(entry));
        self.entries.run_pending_tasks();
    }

    fn invalidate(&self, key: &CacheKey) {
        self.entries.invalidate(key);
        self.entries.run_pending_tasks();
    }

    fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            current_size: self.entries.weighted_size(),
            entries: self.entries.entry_count(),
            capacity: self.capacity,
        }
    }
}
