//! Single-slot rate cache with TTL support.

use budgetshare_common::{constants, Clock, SystemClock, Timestamp};
use chrono::Duration;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::snapshot::RateSnapshot;

/// Cached snapshot entry.
#[derive(Debug)]
struct CacheEntry {
    snapshot: Arc<RateSnapshot>,
    stored_at: Timestamp,
}

impl CacheEntry {
    fn age(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.stored_at)
    }
}

/// Configuration for rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// How long a stored snapshot is served by [`RateCache::get`].
    pub ttl: Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            ttl: constants::rate_cache_ttl(),
        }
    }
}

/// Thread-safe single-slot cache of the latest rate snapshot.
///
/// Writers swap in a new immutable entry; readers clone the `Arc` out of the
/// slot, so a reader never sees a partially written snapshot. Expiry is only
/// checked on read and the expired entry is kept for [`get_stale_if_any`].
///
/// [`get_stale_if_any`]: RateCache::get_stale_if_any
pub struct RateCache {
    slot: RwLock<Option<Arc<CacheEntry>>>,
    config: RateCacheConfig,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

impl RateCache {
    /// Create a new rate cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(RateCacheConfig::default())
    }

    /// Create a new rate cache with custom configuration.
    pub fn with_config(config: RateCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(config: RateCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: RwLock::new(None),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
        }
    }

    fn current(&self) -> Option<Arc<CacheEntry>> {
        self.slot.read().clone()
    }

    /// Get the snapshot if it is younger than the TTL.
    pub fn get(&self) -> Option<Arc<RateSnapshot>> {
        if let Some(entry) = self.current() {
            let age = entry.age(self.clock.now());
            if age < self.config.ttl {
                debug!(age_secs = age.num_seconds(), "Cache hit");
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.snapshot.clone());
            }
            debug!(age_secs = age.num_seconds(), "Cache entry expired");
        } else {
            debug!("Cache miss");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Replace the cached snapshot and restart its TTL.
    pub fn set(&self, snapshot: Arc<RateSnapshot>) {
        let entry = Arc::new(CacheEntry {
            snapshot,
            stored_at: self.clock.now(),
        });
        *self.slot.write() = Some(entry);
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    /// Last stored snapshot, ignoring the TTL.
    pub fn get_stale_if_any(&self) -> Option<Arc<RateSnapshot>> {
        self.current().map(|entry| entry.snapshot.clone())
    }

    /// Drop the cached snapshot.
    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let age = self.current().map(|entry| entry.age(now));

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            populated: age.is_some(),
            fresh: age.map(|a| a < self.config.ttl).unwrap_or(false),
            age,
        }
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub populated: bool,
    pub fresh: bool,
    pub age: Option<Duration>,
}
