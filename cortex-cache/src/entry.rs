//! Cache entries and per-namespace statistics.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// A cached value plus the bookkeeping eviction decisions need.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: String,
    value: Value,
    created_at: Instant,
    last_accessed_at: Instant,
    approx_size_bytes: usize,
    access_count: u64,
    /// Logical access clock; strictly increasing within a namespace.
    pub(crate) recency: u64,
    /// Logical creation clock; breaks recency ties.
    pub(crate) created_seq: u64,
}

impl CacheEntry {
    pub(crate) fn new(key: String, value: Value, now: Instant, tick: u64) -> Self {
        let approx_size_bytes = key.len() + value.to_string().len();
        Self {
            key,
            value,
            created_at: now,
            last_accessed_at: now,
            approx_size_bytes,
            access_count: 0,
            recency: tick,
            created_seq: tick,
        }
    }

    pub(crate) fn touch(&mut self, now: Instant, tick: u64) {
        self.last_accessed_at = now;
        self.access_count += 1;
        self.recency = tick;
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> Instant {
        self.last_accessed_at
    }

    pub fn approx_size_bytes(&self) -> usize {
        self.approx_size_bytes
    }

    /// Number of cache hits served by this entry.
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Entries expire strictly after `ttl` has elapsed since creation.
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.age(now) > ttl
    }
}

/// Statistics about one namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of successful writes.
    pub sets: u64,
    /// Number of evictions (capacity, invalidation, optimization).
    pub evictions: u64,
    /// Number of entries removed because their TTL elapsed.
    pub expirations: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Approximate memory usage in bytes.
    pub memory_bytes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total lookups served.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}
