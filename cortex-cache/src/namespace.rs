//! Per-namespace store.
//!
//! One [`NamespaceStore`] holds the entries, counters and configuration of a
//! namespace. The adaptive cache wraps each store in its own mutex; every
//! method here is a short, non-blocking critical section.

use crate::entry::{CacheEntry, CacheStats};
use cortex_core::{CacheTuning, NamespaceConfig, NamespaceHealth, NamespaceStatus};
use serde_json::Value;
use std::collections::HashMap;
use tokio::time::Instant;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits: u64,
    misses: u64,
    sets: u64,
    evictions: u64,
    expirations: u64,
}

#[derive(Debug)]
pub(crate) struct NamespaceStore {
    config: NamespaceConfig,
    entries: HashMap<String, CacheEntry>,
    counters: Counters,
    clock: u64,
}

impl NamespaceStore {
    pub fn new(config: NamespaceConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            counters: Counters::default(),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Replace the configuration, evicting LRU entries if the new capacity is smaller.
    pub fn reconfigure(&mut self, config: NamespaceConfig) -> usize {
        self.config = config;
        let mut evicted = 0;
        while self.entries.len() > self.config.max_size.max(1) {
            if !self.evict_lru() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up a key. Expired entries are removed and count as a miss.
    pub fn get(&mut self, key: &str, now: Instant) -> Option<Value> {
        let ttl = self.config.ttl;
        let expired = match self.entries.get(key) {
            None => {
                self.counters.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(ttl, now),
        };

        if expired {
            self.entries.remove(key);
            self.counters.expirations += 1;
            self.counters.misses += 1;
            return None;
        }

        let tick = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.touch(now, tick);
        self.counters.hits += 1;
        Some(entry.value().clone())
    }

    /// Insert or overwrite a key, evicting the LRU entry when a new key would
    /// exceed capacity. Returns the evicted key, if any.
    pub fn set(&mut self, key: String, value: Value, now: Instant) -> Option<String> {
        let mut evicted = None;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_size.max(1) {
            evicted = self.lru_key();
            if let Some(victim) = &evicted {
                self.entries.remove(victim);
                self.counters.evictions += 1;
            }
        }

        let tick = self.tick();
        self.entries
            .insert(key.clone(), CacheEntry::new(key, value, now, tick));
        self.counters.sets += 1;
        evicted
    }

    /// Least recently accessed key; ties go to the earliest created entry.
    fn lru_key(&self) -> Option<String> {
        self.entries
            .values()
            .min_by_key(|e| (e.recency, e.created_seq))
            .map(|e| e.key().to_string())
    }

    fn evict_lru(&mut self) -> bool {
        match self.lru_key() {
            Some(key) => {
                self.entries.remove(&key);
                self.counters.evictions += 1;
                true
            }
            None => false,
        }
    }

    pub fn invalidate<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&str, &CacheEntry) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, entry| !predicate(key, entry));
        let removed = before - self.entries.len();
        self.counters.evictions += removed as u64;
        removed
    }

    /// Remove every expired entry.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(ttl, now));
        let removed = before - self.entries.len();
        self.counters.expirations += removed as u64;
        removed
    }

    /// Evict the least-frequently accessed `fraction` of entries.
    pub fn trim_least_frequent(&mut self, fraction: f64) -> usize {
        let count = ((self.entries.len() as f64) * fraction).floor() as usize;
        if count == 0 {
            return 0;
        }

        let mut ranked: Vec<(u64, u64, String)> = self
            .entries
            .values()
            .map(|e| (e.access_count(), e.recency, e.key().to_string()))
            .collect();
        ranked.sort_unstable();

        for (_, _, key) in ranked.into_iter().take(count) {
            self.entries.remove(&key);
        }
        self.counters.evictions += count as u64;
        count
    }

    /// Release spare capacity held by the backing map.
    pub fn compact(&mut self) {
        self.entries.shrink_to_fit();
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn reset_stats(&mut self) {
        self.counters = Counters::default();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits,
            misses: self.counters.misses,
            sets: self.counters.sets,
            evictions: self.counters.evictions,
            expirations: self.counters.expirations,
            entry_count: self.entries.len() as u64,
            memory_bytes: self
                .entries
                .values()
                .map(|e| e.approx_size_bytes() as u64)
                .sum(),
        }
    }

    pub fn utilization(&self) -> f64 {
        self.entries.len() as f64 / self.config.max_size.max(1) as f64
    }

    /// Health verdict; a namespace with no lookups yet is judged on utilization only.
    pub fn health(&self, tuning: &CacheTuning) -> NamespaceHealth {
        let stats = self.stats();
        let hit_rate = stats.hit_rate();
        let utilization = self.utilization();
        let low_hits = stats.lookups() > 0 && hit_rate < tuning.poor_hit_rate;
        let status = if low_hits || utilization > tuning.high_utilization {
            NamespaceStatus::Poor
        } else {
            NamespaceStatus::Good
        };
        NamespaceHealth {
            size: self.entries.len(),
            max_size: self.config.max_size,
            utilization,
            hit_rate,
            status,
        }
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn store(max_size: usize, ttl_secs: u64) -> NamespaceStore {
        NamespaceStore::new(NamespaceConfig::new(max_size, Duration::from_secs(ttl_secs)))
    }

    #[test]
    fn test_get_miss_then_hit() {
        let now = Instant::now();
        let mut s = store(10, 60);
        assert_eq!(s.get("a", now), None);
        s.set("a".to_string(), json!(1), now);
        assert_eq!(s.get("a", now), Some(json!(1)));

        let stats = s.stats();
        assert_eq!((stats.hits, stats.misses, stats.sets), (1, 1, 1));
    }

    #[test]
    fn test_expired_entry_is_removed_on_get() {
        let now = Instant::now();
        let mut s = store(10, 5);
        s.set("a".to_string(), json!(1), now);

        assert_eq!(s.get("a", now + Duration::from_secs(6)), None);
        assert_eq!(s.len(), 0);
        assert_eq!(s.stats().expirations, 1);
        assert_eq!(s.stats().misses, 1);
    }

    #[test]
    fn test_expiry_ignores_recent_access() {
        let now = Instant::now();
        let mut s = store(10, 5);
        s.set("a".to_string(), json!(1), now);
        assert!(s.get("a", now + Duration::from_secs(4)).is_some());
        assert!(s.get("a", now + Duration::from_secs(6)).is_none());
    }

    #[test]
    fn test_lru_eviction_respects_touch() {
        let now = Instant::now();
        let mut s = store(2, 60);
        s.set("A".to_string(), json!("a"), now);
        s.set("B".to_string(), json!("b"), now);
        assert!(s.get("A", now).is_some());

        let evicted = s.set("C".to_string(), json!("c"), now);
        assert_eq!(evicted.as_deref(), Some("B"));
        let mut keys: Vec<&str> = s.iter().map(|e| e.key()).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["A", "C"]);
        assert_eq!(s.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let now = Instant::now();
        let mut s = store(2, 60);
        s.set("A".to_string(), json!(1), now);
        s.set("B".to_string(), json!(2), now);
        assert_eq!(s.set("A".to_string(), json!(3), now), None);
        assert_eq!(s.len(), 2);
        assert_eq!(s.get("A", now), Some(json!(3)));
    }

    #[test]
    fn test_invalidate_counts_evictions() {
        let now = Instant::now();
        let mut s = store(10, 60);
        for i in 0..5 {
            s.set(format!("k{i}"), json!(i), now);
        }
        let removed = s.invalidate(|_, entry| entry.value().as_i64().unwrap_or(0) % 2 == 0);
        assert_eq!(removed, 3);
        assert_eq!(s.len(), 2);
        assert_eq!(s.stats().evictions, 3);
    }

    #[test]
    fn test_trim_least_frequent_keeps_hot_entries() {
        let now = Instant::now();
        let mut s = store(100, 60);
        for i in 0..10 {
            s.set(format!("k{i}"), json!(i), now);
        }
        for _ in 0..3 {
            for i in 5..10 {
                s.get(&format!("k{i}"), now);
            }
        }

        assert_eq!(s.trim_least_frequent(0.3), 3);
        assert_eq!(s.len(), 7);
        for i in 5..10 {
            assert!(s.iter().any(|e| e.key() == format!("k{i}")));
        }
    }

    #[test]
    fn test_reconfigure_shrinks_to_new_capacity() {
        let now = Instant::now();
        let mut s = store(5, 60);
        for i in 0..5 {
            s.set(format!("k{i}"), json!(i), now);
        }
        let evicted = s.reconfigure(NamespaceConfig::new(2, Duration::from_secs(60)));
        assert_eq!(evicted, 3);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_health_flags_full_namespace() {
        let now = Instant::now();
        let mut s = store(2, 60);
        s.set("a".to_string(), json!(1), now);
        s.set("b".to_string(), json!(2), now);
        let health = s.health(&CacheTuning::default());
        assert_eq!(health.status, NamespaceStatus::Poor);
        assert!((health.utilization - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_health_ignores_hit_rate_without_lookups() {
        let s = store(10, 60);
        assert_eq!(s.health(&CacheTuning::default()).status, NamespaceStatus::Good);
    }
}
